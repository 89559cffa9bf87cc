//! # Handler abstraction and function-backed implementation.
//!
//! A [`Handler`] is the external collaborator behind one [`TaskKind`](crate::TaskKind):
//! it receives the task payload and a [`CancellationToken`], performs the side
//! effects (network calls, signing) and returns a value or an [`ExecError`].
//! The engine knows nothing about its internals.
//!
//! [`HandlerFn`] wraps a closure `F: Fn(P, CancellationToken) -> Fut`, producing a
//! fresh future per attempt. No state is shared between attempts unless the
//! closure captures it explicitly (e.g. an `Arc<...>`).
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use fleetvisor::{ExecError, Handler, HandlerFn, HandlerRef};
//!
//! let balance: HandlerRef<String, u128> =
//!     HandlerFn::arc("balance", |address: String, ctx: CancellationToken| async move {
//!         if ctx.is_cancelled() {
//!             return Err(ExecError::Canceled);
//!         }
//!         if address.is_empty() {
//!             return Err(ExecError::fatal("empty address"));
//!         }
//!         Ok(42_u128)
//!     });
//!
//! assert_eq!(balance.name(), "balance");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ExecError;

/// # Asynchronous, cancelable operation for one task kind.
///
/// Implementations should check `ctx` at their own suspension points and return
/// [`ExecError::Canceled`] promptly once it fires.
///
/// Return [`ExecError::Fail`] for anything worth another attempt (timeouts,
/// 5xx, an expired session the handler could not refresh) and
/// [`ExecError::Fatal`] for input that will never work (malformed key).
#[async_trait]
pub trait Handler<P, V>: Send + Sync + 'static
where
    P: Send + 'static,
    V: Send + 'static,
{
    /// Human-readable name (for logs).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Runs one attempt with the given payload.
    async fn handle(&self, payload: P, ctx: CancellationToken) -> Result<V, ExecError>;
}

/// Shared handle to a handler.
pub type HandlerRef<P, V> = Arc<dyn Handler<P, V>>;

/// Function-backed handler.
///
/// Wraps a closure that *creates* a new future per attempt.
#[derive(Debug)]
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    ///
    /// Prefer [`HandlerFn::arc`] when you immediately need a [`HandlerRef`].
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the handler and returns it behind an `Arc`.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<P, V, F, Fut> Handler<P, V> for HandlerFn<F>
where
    P: Send + 'static,
    V: Send + 'static,
    F: Fn(P, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, ExecError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, payload: P, ctx: CancellationToken) -> Result<V, ExecError> {
        (self.f)(payload, ctx).await
    }
}

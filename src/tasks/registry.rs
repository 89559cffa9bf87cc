//! # Kind → handler table.
//!
//! [`HandlerRegistry`] binds every [`TaskKind`] to exactly one [`Handler`].
//! Completeness is checked once, when the registry is built, so a missing
//! binding is a startup configuration error instead of a failure discovered
//! the first time such a task runs.
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use fleetvisor::{ExecError, HandlerFn, HandlerRegistry, RuntimeError, TaskKind};
//!
//! let noop = HandlerFn::arc("noop", |_p: (), _ctx: CancellationToken| async move {
//!     Ok::<_, ExecError>(())
//! });
//!
//! let partial = HandlerRegistry::<(), ()>::builder()
//!     .register(TaskKind::Authenticate, noop.clone())
//!     .build();
//! assert!(matches!(partial, Err(RuntimeError::MissingHandler { kind: TaskKind::Transfer })));
//!
//! let full = HandlerRegistry::<(), ()>::builder()
//!     .register_each(TaskKind::ALL, noop)
//!     .build();
//! assert!(full.is_ok());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RuntimeError;
use crate::tasks::handler::{Handler, HandlerRef};
use crate::tasks::kind::TaskKind;

/// Validated, immutable kind → handler table.
pub struct HandlerRegistry<P, V> {
    handlers: HashMap<TaskKind, HandlerRef<P, V>>,
}

impl<P, V> HandlerRegistry<P, V>
where
    P: Send + 'static,
    V: Send + 'static,
{
    /// Starts an empty builder.
    pub fn builder() -> HandlerRegistryBuilder<P, V> {
        HandlerRegistryBuilder {
            handlers: HashMap::new(),
        }
    }

    /// Returns the handler bound to `kind`.
    pub fn resolve(&self, kind: TaskKind) -> Result<HandlerRef<P, V>, RuntimeError> {
        self.handlers
            .get(&kind)
            .cloned()
            .ok_or(RuntimeError::MissingHandler { kind })
    }

    /// Number of bound kinds.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// `true` if nothing is bound (never the case for a built registry).
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Builder for [`HandlerRegistry`].
pub struct HandlerRegistryBuilder<P, V> {
    handlers: HashMap<TaskKind, HandlerRef<P, V>>,
}

impl<P, V> HandlerRegistryBuilder<P, V>
where
    P: Send + 'static,
    V: Send + 'static,
{
    /// Binds `handler` to `kind`, replacing any earlier binding.
    pub fn register<H>(mut self, kind: TaskKind, handler: Arc<H>) -> Self
    where
        H: Handler<P, V>,
    {
        self.handlers.insert(kind, handler);
        self
    }

    /// Binds one handler to several kinds.
    pub fn register_each<H>(mut self, kinds: impl IntoIterator<Item = TaskKind>, handler: Arc<H>) -> Self
    where
        H: Handler<P, V>,
    {
        for kind in kinds {
            self.handlers.insert(kind, handler.clone());
        }
        self
    }

    /// Validates that every [`TaskKind`] is bound and returns the registry.
    ///
    /// Fails with [`RuntimeError::MissingHandler`] naming the first unbound kind
    /// in [`TaskKind::ALL`] order.
    pub fn build(self) -> Result<HandlerRegistry<P, V>, RuntimeError> {
        if let Some(kind) = TaskKind::ALL
            .into_iter()
            .find(|kind| !self.handlers.contains_key(kind))
        {
            return Err(RuntimeError::MissingHandler { kind });
        }
        Ok(HandlerRegistry {
            handlers: self.handlers,
        })
    }
}

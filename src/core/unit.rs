//! # Isolated execution unit: one attempt on its own tokio task.
//!
//! [`run_isolated`] spawns the handler future onto a fresh tokio task and awaits
//! it. Whatever happens inside stays inside:
//!
//! ```text
//! handler returns Ok(v)        → Ok(v)
//! handler returns Err(e)       → Err(e)
//! handler panics               → Err(Panicked { info })
//! timeout elapses              → cancel attempt token, abort unit → Err(Timeout)
//! unit aborted from outside    → Err(Canceled)
//! caller drops the future      → unit aborted (AbortOnDropHandle)
//! ```
//!
//! [`run_attempt`] wraps one unit run with lifecycle events, the way every
//! layer above (retry runner, supervisor) starts an attempt.
//!
//! ## Rules
//! - Each attempt gets a **child token** of the caller's token; cancelling it
//!   never affects the parent.
//! - Always publishes exactly one terminal event per attempt:
//!   `AttemptSucceeded` or `AttemptFailed`.
//! - `TimeoutHit` is published **in addition to** `AttemptFailed` on timeout.

use std::any::Any;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

use crate::error::ExecError;
use crate::events::{Bus, Event, EventKind};
use crate::tasks::{HandlerRef, TaskId, TaskKind};

/// Identity of one attempt, for event metadata.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AttemptMeta<'a> {
    pub task: &'a TaskId,
    pub kind: TaskKind,
    /// 1-based attempt number.
    pub attempt: u32,
}

impl AttemptMeta<'_> {
    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind)
            .with_task(self.task)
            .with_task_kind(self.kind)
            .with_attempt(self.attempt)
    }
}

/// Runs `handler(payload)` on its own tokio task.
///
/// `timeout` of `None` (or zero) means no limit.
pub(crate) async fn run_isolated<P, V>(
    handler: HandlerRef<P, V>,
    payload: P,
    parent: &CancellationToken,
    timeout: Option<Duration>,
) -> Result<V, ExecError>
where
    P: Send + 'static,
    V: Send + 'static,
{
    let child = parent.child_token();
    let ctx = child.clone();
    let mut unit = AbortOnDropHandle::new(tokio::spawn(async move {
        handler.handle(payload, ctx).await
    }));

    let joined = match timeout.filter(|d| !d.is_zero()) {
        Some(dur) => match time::timeout(dur, &mut unit).await {
            Ok(joined) => joined,
            Err(_elapsed) => {
                child.cancel();
                unit.abort();
                return Err(ExecError::Timeout { timeout: dur });
            }
        },
        None => (&mut unit).await,
    };

    match joined {
        Ok(outcome) => outcome,
        Err(join_err) if join_err.is_panic() => Err(ExecError::Panicked {
            info: panic_message(join_err.into_panic().as_ref()),
        }),
        Err(_) => Err(ExecError::Canceled),
    }
}

/// Runs one attempt through [`run_isolated`] and publishes its lifecycle events.
pub(crate) async fn run_attempt<P, V>(
    handler: HandlerRef<P, V>,
    payload: P,
    parent: &CancellationToken,
    timeout: Option<Duration>,
    meta: AttemptMeta<'_>,
    bus: &Bus,
) -> Result<V, ExecError>
where
    P: Send + 'static,
    V: Send + 'static,
{
    bus.publish(meta.event(EventKind::AttemptStarting));

    let res = run_isolated(handler, payload, parent, timeout).await;
    match &res {
        Ok(_) => bus.publish(meta.event(EventKind::AttemptSucceeded)),
        Err(err) => {
            if let ExecError::Timeout { timeout } = err {
                bus.publish(meta.event(EventKind::TimeoutHit).with_timeout(*timeout));
            }
            bus.publish(
                meta.event(EventKind::AttemptFailed)
                    .with_reason(err.as_message()),
            );
        }
    }
    res
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

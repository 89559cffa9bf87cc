//! # LogWriter: events as `tracing` records.
//!
//! Renders every [`Event`] as one structured `tracing` record. Levels follow
//! how much an operator needs to see:
//!
//! | Level   | Events                                                          |
//! |---------|-----------------------------------------------------------------|
//! | `error` | `SupervisorTerminated`, `SubscriberPanicked`, `SubscriberOverflow` |
//! | `warn`  | `RetryScheduled`, `RetriesExhausted`, `AbnormalExit`, `TimeoutHit`, `GraceExceeded` |
//! | `info`  | batch start/finish, supervisor start/exit, restarts, shutdown    |
//! | `debug` | attempts and admission                                           |
//! | `trace` | slot writes                                                      |
//!
//! Install a formatter first (see [`logger_init`](crate::logger_init) with the
//! `logging` feature) or nothing is printed.

use async_trait::async_trait;
use tracing::{debug, error, info, trace, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        log_event(e);
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}

/// Short description of an event kind.
pub fn message_for(kind: EventKind) -> &'static str {
    match kind {
        // subscriber
        EventKind::SubscriberPanicked => "subscriber panicked while processing an event",
        EventKind::SubscriberOverflow => {
            "event dropped for a subscriber (queue full or worker closed)"
        }

        // shutdown
        EventKind::ShutdownRequested => "shutdown requested",
        EventKind::AllStoppedWithin => "all continuous tasks stopped within grace period",
        EventKind::GraceExceeded => "grace exceeded; some continuous tasks did not stop in time",

        // attempts
        EventKind::AttemptStarting => "attempt starting",
        EventKind::AttemptSucceeded => "attempt succeeded",
        EventKind::AttemptFailed => "attempt failed",
        EventKind::TimeoutHit => "attempt exceeded its timeout",

        // retry
        EventKind::RetryScheduled => "retry scheduled after failure",
        EventKind::RecoveredAfterRetry => "task recovered after retry",
        EventKind::RetriesExhausted => "task gave up",

        // supervision
        EventKind::SupervisorStarting => "continuous task starting",
        EventKind::NormalExit => "continuous task exited normally",
        EventKind::AbnormalExit => "continuous task exited abnormally",
        EventKind::RestartScheduled => "restart scheduled",
        EventKind::SupervisorTerminated => "continuous task terminated; no further restarts",
        EventKind::SupervisorCanceled => "continuous task cancelled",

        // batch
        EventKind::BatchStarted => "batch started",
        EventKind::AdmissionWaiting => "batch at capacity; waiting for a completion",
        EventKind::TaskAdmitted => "task admitted",
        EventKind::SlotFilled => "result slot filled",
        EventKind::BatchFinished => "batch finished",
    }
}

/// Writes one event as a `tracing` record.
pub fn log_event(e: &Event) {
    let msg = message_for(e.kind);
    let task = e.task.as_deref().unwrap_or("unknown");
    let kind = e.task_kind.map(|k| k.as_label()).unwrap_or("none");
    let reason = e.reason.as_deref().unwrap_or("unknown");
    let attempt = e.attempt.unwrap_or(0);
    let restarts = e.restarts.unwrap_or(0);
    let delay_ms = e.delay_ms.unwrap_or(0);

    match e.kind {
        EventKind::SubscriberPanicked | EventKind::SubscriberOverflow => {
            error!(subscriber = task, reason, "{msg}")
        }

        EventKind::ShutdownRequested | EventKind::AllStoppedWithin => info!("{msg}"),
        EventKind::GraceExceeded => warn!(stuck = reason, "{msg}"),

        EventKind::AttemptStarting | EventKind::AttemptSucceeded => {
            debug!(task, kind, attempt, "{msg}")
        }
        EventKind::AttemptFailed => debug!(task, kind, attempt, reason, "{msg}"),
        EventKind::TimeoutHit => warn!(
            task,
            attempt,
            timeout_ms = e.timeout_ms.unwrap_or(0),
            "{msg}"
        ),

        EventKind::RetryScheduled => warn!(task, kind, attempt, delay_ms, reason, "{msg}"),
        EventKind::RecoveredAfterRetry => info!(task, kind, attempt, "{msg}"),
        EventKind::RetriesExhausted => warn!(task, kind, attempts = attempt, reason, "{msg}"),

        EventKind::SupervisorStarting | EventKind::NormalExit | EventKind::SupervisorCanceled => {
            info!(task, kind, restarts, "{msg}")
        }
        EventKind::AbnormalExit => warn!(task, kind, restarts, reason, "{msg}"),
        EventKind::RestartScheduled => info!(task, kind, restarts, delay_ms, reason, "{msg}"),
        EventKind::SupervisorTerminated => error!(task, kind, restarts, reason, "{msg}"),

        EventKind::BatchStarted => info!(
            total = e.total.unwrap_or(0),
            max_parallel = e.max_parallel.unwrap_or(0),
            "{msg}"
        ),
        EventKind::AdmissionWaiting => debug!(
            next = e.index.unwrap_or(0),
            max_parallel = e.max_parallel.unwrap_or(0),
            "{msg}"
        ),
        EventKind::TaskAdmitted => debug!(task, kind, index = e.index.unwrap_or(0), "{msg}"),
        EventKind::SlotFilled => {
            if e.reason.is_some() {
                trace!(task, index = e.index.unwrap_or(0), reason, "{msg}")
            } else {
                trace!(task, index = e.index.unwrap_or(0), "{msg}")
            }
        }
        EventKind::BatchFinished => info!(
            total = e.total.unwrap_or(0),
            succeeded = e.succeeded.unwrap_or(0),
            failed = e.failed.unwrap_or(0),
            "{msg}"
        ),
    }
}

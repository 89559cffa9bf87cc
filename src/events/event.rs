//! # Events emitted by the engine.
//!
//! The [`EventKind`] enum classifies event types across five groups:
//! - **Attempt events**: one execution unit run (starting, succeeded, failed, timeout)
//! - **Retry events**: backoff scheduling and exhaustion of short tasks
//! - **Supervision events**: continuous task phases (starting, exits, restarts, termination)
//! - **Batch events**: admission, slot filling and completion of a batch call
//! - **Engine events**: shutdown and subscriber health
//!
//! The [`Event`] struct carries metadata such as timestamps, task id and kind,
//! attempt numbers, delays, slot indexes and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use fleetvisor::{Event, EventKind, TaskKind};
//!
//! let ev = Event::new(EventKind::RetryScheduled)
//!     .with_task("authenticate-3")
//!     .with_task_kind(TaskKind::Authenticate)
//!     .with_attempt(2)
//!     .with_delay(Duration::from_secs(4))
//!     .with_reason("503 service unavailable");
//!
//! assert_eq!(ev.kind, EventKind::RetryScheduled);
//! assert_eq!(ev.task.as_deref(), Some("authenticate-3"));
//! assert_eq!(ev.delay_ms, Some(4_000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::tasks::TaskKind;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of engine events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `task` (subscriber name), `reason` (panic info).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `task` (subscriber name), `reason` ("full" / "closed").
    SubscriberOverflow,

    // === Shutdown events ===
    /// Shutdown requested (explicit call or OS signal).
    ShutdownRequested,

    /// All background continuous tasks stopped within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some continuous tasks did not stop in time.
    ///
    /// Sets: `reason` (stuck task ids).
    GraceExceeded,

    // === Attempt events ===
    /// An execution unit is starting.
    ///
    /// Sets: `task`, `task_kind`, `attempt` (1-based).
    AttemptStarting,

    /// An attempt returned a value.
    ///
    /// Sets: `task`, `task_kind`, `attempt`.
    AttemptSucceeded,

    /// An attempt failed (error, panic or timeout).
    ///
    /// Sets: `task`, `task_kind`, `attempt`, `reason`.
    AttemptFailed,

    /// An attempt exceeded the unit timeout (always followed by `AttemptFailed`).
    ///
    /// Sets: `task`, `attempt`, `timeout_ms`.
    TimeoutHit,

    // === Retry events ===
    /// Next attempt of a short task scheduled after a failure.
    ///
    /// Sets: `task`, `task_kind`, `attempt` (failed attempt), `delay_ms`, `reason`.
    RetryScheduled,

    /// A short task succeeded after one or more retries.
    ///
    /// Sets: `task`, `task_kind`, `attempt` (successful attempt).
    RecoveredAfterRetry,

    /// A short task gave up: retries exhausted or error not retryable.
    ///
    /// Sets: `task`, `task_kind`, `attempt` (total attempts), `reason`.
    RetriesExhausted,

    // === Supervision events ===
    /// Continuous task is (re)starting on a fresh execution unit.
    ///
    /// Sets: `task`, `task_kind`, `restarts` (restarts so far).
    SupervisorStarting,

    /// Continuous task returned on its own; it will not be restarted.
    ///
    /// Sets: `task`, `task_kind`, `restarts`.
    NormalExit,

    /// Continuous task failed or its unit faulted.
    ///
    /// Sets: `task`, `task_kind`, `restarts`, `reason`.
    AbnormalExit,

    /// Restart scheduled after an abnormal exit.
    ///
    /// Sets: `task`, `task_kind`, `restarts` (restarts so far), `delay_ms`, `reason`.
    RestartScheduled,

    /// Continuous task is no longer serviced (restart ceiling or fatal error).
    ///
    /// Sets: `task`, `task_kind`, `restarts`, `reason`.
    SupervisorTerminated,

    /// Supervision stopped because the engine was cancelled.
    ///
    /// Sets: `task`, `task_kind`, `restarts`.
    SupervisorCanceled,

    // === Batch events ===
    /// Batch call accepted its task list.
    ///
    /// Sets: `total`, `max_parallel`.
    BatchStarted,

    /// Admission paused: the in-flight set is at capacity.
    ///
    /// Sets: `index` (next task waiting for admission), `max_parallel`.
    AdmissionWaiting,

    /// A task was admitted into the in-flight set.
    ///
    /// Sets: `task`, `task_kind`, `index`, `total`.
    TaskAdmitted,

    /// A result slot was filled.
    ///
    /// Sets: `task`, `index`, `total`, `reason` (only on failure).
    SlotFilled,

    /// Batch call finished; every slot is filled.
    ///
    /// Sets: `total`, `succeeded`, `failed`.
    BatchFinished,
}

/// Engine event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Task id (or subscriber name for subscriber events).
    pub task: Option<Arc<str>>,
    /// Task kind, when the event concerns a task.
    pub task_kind: Option<TaskKind>,
    /// Attempt number (starting from 1).
    pub attempt: Option<u32>,
    /// Restarts performed so far by a continuous supervisor.
    pub restarts: Option<u32>,
    /// Backoff or restart delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Unit timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,

    /// Slot index within a batch.
    pub index: Option<usize>,
    /// Batch size.
    pub total: Option<usize>,
    /// Concurrency ceiling of a batch.
    pub max_parallel: Option<usize>,
    /// Successful results in a finished batch.
    pub succeeded: Option<usize>,
    /// Failed results in a finished batch.
    pub failed: Option<usize>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            task_kind: None,
            attempt: None,
            restarts: None,
            delay_ms: None,
            timeout_ms: None,
            reason: None,
            index: None,
            total: None,
            max_parallel: None,
            succeeded: None,
            failed: None,
        }
    }

    /// Attaches a task id.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a task kind.
    #[inline]
    pub fn with_task_kind(mut self, kind: TaskKind) -> Self {
        self.task_kind = Some(kind);
        self
    }

    /// Attaches an attempt number.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches the restart count.
    #[inline]
    pub fn with_restarts(mut self, n: u32) -> Self {
        self.restarts = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds, saturating).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a timeout (stored as milliseconds, saturating).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a batch slot index.
    #[inline]
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Attaches the batch size.
    #[inline]
    pub fn with_total(mut self, total: usize) -> Self {
        self.total = Some(total);
        self
    }

    /// Attaches the batch concurrency ceiling.
    #[inline]
    pub fn with_max_parallel(mut self, n: usize) -> Self {
        self.max_parallel = Some(n);
        self
    }

    /// Attaches aggregate batch counts.
    #[inline]
    pub fn with_counts(mut self, succeeded: usize, failed: usize) -> Self {
        self.succeeded = Some(succeeded);
        self.failed = Some(failed);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

//! Error types used by the fleetvisor engine and its handlers.
//!
//! This module defines two main error enums:
//!
//! - [`ExecError`]: errors raised by a single execution attempt of a handler.
//! - [`RuntimeError`]: errors raised by the engine itself (configuration,
//!   supervision exhaustion, shutdown).
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics
//! and [`ExecError::is_retryable`] drives both the retry runner and the supervisor.

use std::time::Duration;
use thiserror::Error;

use crate::tasks::TaskKind;

/// # Errors produced by a single execution attempt.
///
/// Handlers return these from [`Handler::handle`](crate::Handler::handle); the
/// execution unit adds `Timeout`, `Panicked` and `Canceled` on its own.
///
/// | Variant    | Meaning                                                        | Retried |
/// |------------|----------------------------------------------------------------|---------|
/// | `Fail`     | transient network/service hiccup, or expired authorization      | yes     |
/// | `Timeout`  | attempt exceeded [`EngineConfig::unit_timeout`](crate::EngineConfig) | yes |
/// | `Panicked` | handler panicked inside its execution unit                      | yes     |
/// | `Fatal`    | permanent configuration problem (malformed input, bad key)      | no      |
/// | `Canceled` | engine cancellation observed                                     | no      |
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// Attempt failed but may succeed if retried.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable error (should not be retried).
    #[error("fatal error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Attempt exceeded its timeout.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// Handler panicked; the panic was contained by the execution unit.
    #[error("execution unit panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// Attempt (or its backoff) was cancelled by the engine.
    #[error("context cancelled")]
    Canceled,
}

impl ExecError {
    /// Shorthand for a retryable [`ExecError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        ExecError::Fail {
            error: error.into(),
        }
    }

    /// Shorthand for a non-retryable [`ExecError::Fatal`].
    pub fn fatal(error: impl Into<String>) -> Self {
        ExecError::Fatal {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use fleetvisor::ExecError;
    ///
    /// assert_eq!(ExecError::fail("boom").as_label(), "exec_failed");
    /// assert_eq!(ExecError::Canceled.as_label(), "exec_canceled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ExecError::Fail { .. } => "exec_failed",
            ExecError::Fatal { .. } => "exec_fatal",
            ExecError::Timeout { .. } => "exec_timeout",
            ExecError::Panicked { .. } => "exec_panicked",
            ExecError::Canceled => "exec_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ExecError::Fail { error } => format!("error: {error}"),
            ExecError::Fatal { error } => format!("fatal: {error}"),
            ExecError::Timeout { timeout } => format!("timeout: {timeout:?}"),
            ExecError::Panicked { info } => format!("panic: {info}"),
            ExecError::Canceled => "context cancelled".to_string(),
        }
    }

    /// Indicates whether another attempt may be made after this error.
    ///
    /// Returns `true` for `Fail`, `Timeout` and `Panicked`; `false` for `Fatal`
    /// and `Canceled`.
    ///
    /// # Example
    /// ```
    /// use fleetvisor::ExecError;
    ///
    /// assert!(ExecError::fail("503").is_retryable());
    /// assert!(!ExecError::fatal("invalid private key").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExecError::Fail { .. } | ExecError::Timeout { .. } | ExecError::Panicked { .. }
        )
    }
}

/// # Errors produced by the engine.
///
/// These represent configuration problems detected at startup and terminal
/// outcomes of supervision or shutdown.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A string tag did not name any [`TaskKind`].
    #[error("unknown task kind {tag:?}")]
    UnknownTaskKind {
        /// The rejected tag.
        tag: String,
    },

    /// No handler registered for a task kind.
    #[error("no handler registered for task kind {kind}")]
    MissingHandler {
        /// The kind left without a handler.
        kind: TaskKind,
    },

    /// A continuous task crashed more often than its restart ceiling allows.
    #[error("task {task} terminated after {restarts} restarts; last error: {last_error}")]
    RestartsExhausted {
        /// Task id.
        task: String,
        /// Restarts performed before giving up.
        restarts: u32,
        /// Error of the final attempt.
        last_error: ExecError,
    },

    /// A continuous task failed with a non-retryable error.
    #[error("task {task} terminated by fatal error after {restarts} restarts: {error}")]
    Fatal {
        /// Task id.
        task: String,
        /// Restarts performed before the fatal error.
        restarts: u32,
        /// The fatal error.
        error: ExecError,
    },

    /// Supervision stopped because the engine was cancelled.
    #[error("task {task} cancelled")]
    Canceled {
        /// Task id.
        task: String,
    },

    /// A non-continuous task kind was handed to the continuous supervisor.
    #[error("task {task} of kind {kind} is not continuous")]
    NotContinuous {
        /// Task id.
        task: String,
        /// The rejected kind.
        kind: TaskKind,
    },

    /// A background continuous task with the same id is still running.
    #[error("task {task} is already running")]
    DuplicateTask {
        /// Task id.
        task: String,
    },

    /// OS signal listeners could not be installed.
    #[error("failed to install signal handlers: {error}")]
    Signal {
        /// The underlying I/O error message.
        error: String,
    },

    /// Shutdown grace period was exceeded; some continuous tasks were still running.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Ids of the tasks that did not stop in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use fleetvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::UnknownTaskKind { .. } => "runtime_unknown_task_kind",
            RuntimeError::MissingHandler { .. } => "runtime_missing_handler",
            RuntimeError::RestartsExhausted { .. } => "runtime_restarts_exhausted",
            RuntimeError::Fatal { .. } => "runtime_fatal",
            RuntimeError::Canceled { .. } => "runtime_canceled",
            RuntimeError::NotContinuous { .. } => "runtime_not_continuous",
            RuntimeError::DuplicateTask { .. } => "runtime_duplicate_task",
            RuntimeError::Signal { .. } => "runtime_signal",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::UnknownTaskKind { tag } => format!("unknown task kind tag={tag}"),
            RuntimeError::MissingHandler { kind } => format!("missing handler kind={kind}"),
            RuntimeError::RestartsExhausted {
                task,
                restarts,
                last_error,
            } => format!(
                "restart ceiling reached task={task} restarts={restarts} last={}",
                last_error.as_message()
            ),
            RuntimeError::Fatal {
                task,
                restarts,
                error,
            } => format!(
                "fatal exit task={task} restarts={restarts} err={}",
                error.as_message()
            ),
            RuntimeError::Canceled { task } => format!("cancelled task={task}"),
            RuntimeError::NotContinuous { task, kind } => {
                format!("not a continuous kind task={task} kind={kind}")
            }
            RuntimeError::DuplicateTask { task } => format!("already running task={task}"),
            RuntimeError::Signal { error } => format!("signal setup failed: {error}"),
            RuntimeError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck tasks={stuck:?}")
            }
        }
    }

    /// Whether this error means a long-running identity is no longer being serviced.
    pub fn is_terminal_supervision(&self) -> bool {
        matches!(
            self,
            RuntimeError::RestartsExhausted { .. } | RuntimeError::Fatal { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ExecError::fail("x").is_retryable());
        assert!(ExecError::Timeout { timeout: Duration::from_secs(1) }.is_retryable());
        assert!(ExecError::Panicked { info: "boom".into() }.is_retryable());
        assert!(!ExecError::fatal("x").is_retryable());
        assert!(!ExecError::Canceled.is_retryable());
    }

    #[test]
    fn runtime_labels_are_stable() {
        let err = RuntimeError::MissingHandler {
            kind: TaskKind::Transfer,
        };
        assert_eq!(err.as_label(), "runtime_missing_handler");
        assert_eq!(err.as_message(), "missing handler kind=transfer");

        let err = RuntimeError::RestartsExhausted {
            task: "poll_loop-1".into(),
            restarts: 3,
            last_error: ExecError::fail("reset"),
        };
        assert!(err.is_terminal_supervision());
        assert!(err.to_string().contains("after 3 restarts"));

        let err = RuntimeError::DuplicateTask {
            task: "wallet-1".into(),
        };
        assert_eq!(err.as_label(), "runtime_duplicate_task");
        assert!(!err.is_terminal_supervision());

        let err = RuntimeError::NotContinuous {
            task: "tx-1".into(),
            kind: TaskKind::Transfer,
        };
        assert_eq!(err.to_string(), "task tx-1 of kind transfer is not continuous");
    }
}

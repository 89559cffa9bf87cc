//! # Submitted tasks and their results.
//!
//! A [`Task`] is `(kind, payload, id)`. The id correlates log lines and result
//! slots; it is **not** an idempotency key, the operations behind a kind may not
//! be safe to repeat.
//!
//! A [`TaskResult`] holds either the handler's value or the last error, never
//! both, plus the number of attempts it took.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ExecError;
use crate::tasks::kind::TaskKind;

/// Process-wide counter for generated task ids.
static TASK_SEQ: AtomicU64 = AtomicU64::new(0);

/// Correlation id of a submitted task.
///
/// Cheap to clone (`Arc<str>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(Arc<str>);

impl TaskId {
    /// Generates a fresh id of the form `"{kind}-{n}"`.
    pub fn generate(kind: TaskKind) -> Self {
        let n = TASK_SEQ.fetch_add(1, Ordering::Relaxed);
        Self(format!("{}-{n}", kind.as_label()).into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s.into())
    }
}

impl From<&TaskId> for Arc<str> {
    fn from(id: &TaskId) -> Self {
        Arc::clone(&id.0)
    }
}

/// One unit of submitted work.
///
/// The payload is cloned for every attempt, so keep it cheap to clone
/// (wrap large data in `Arc`).
///
/// ## Example
/// ```rust
/// use fleetvisor::{Task, TaskKind};
///
/// let task = Task::new(TaskKind::BalanceQuery, "0xabc".to_string());
/// assert_eq!(task.kind(), TaskKind::BalanceQuery);
/// assert!(task.id().as_str().starts_with("balance_query-"));
///
/// let named = Task::with_id(TaskKind::PollLoop, (), "wallet-7");
/// assert_eq!(named.id().as_str(), "wallet-7");
/// ```
#[derive(Debug, Clone)]
pub struct Task<P> {
    kind: TaskKind,
    payload: P,
    id: TaskId,
}

impl<P> Task<P> {
    /// Creates a task with a generated id.
    pub fn new(kind: TaskKind, payload: P) -> Self {
        Self {
            kind,
            payload,
            id: TaskId::generate(kind),
        }
    }

    /// Creates a task with a caller-chosen id.
    pub fn with_id(kind: TaskKind, payload: P, id: impl Into<TaskId>) -> Self {
        Self {
            kind,
            payload,
            id: id.into(),
        }
    }

    /// Returns the task kind.
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Returns a reference to the payload.
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Returns the task id.
    pub fn id(&self) -> &TaskId {
        &self.id
    }
}

/// Outcome of one task: exactly one of value or error.
#[derive(Debug, Clone)]
pub struct TaskResult<V> {
    task_id: TaskId,
    outcome: Result<V, ExecError>,
    attempts: u32,
}

impl<V> TaskResult<V> {
    /// Successful result.
    pub fn success(task_id: TaskId, value: V, attempts: u32) -> Self {
        Self {
            task_id,
            outcome: Ok(value),
            attempts,
        }
    }

    /// Failed result carrying the last error.
    pub fn failure(task_id: TaskId, error: ExecError, attempts: u32) -> Self {
        Self {
            task_id,
            outcome: Err(error),
            attempts,
        }
    }

    /// Id of the task this result belongs to.
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// `true` when the task produced a value.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The value, if the task succeeded.
    pub fn value(&self) -> Option<&V> {
        self.outcome.as_ref().ok()
    }

    /// The last error, if the task failed.
    pub fn error(&self) -> Option<&ExecError> {
        self.outcome.as_ref().err()
    }

    /// Executions performed (first attempt included).
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Borrow the outcome.
    pub fn outcome(&self) -> &Result<V, ExecError> {
        &self.outcome
    }

    /// Consume into the outcome.
    pub fn into_outcome(self) -> Result<V, ExecError> {
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_per_submission() {
        let a = Task::new(TaskKind::Transfer, ());
        let b = Task::new(TaskKind::Transfer, ());
        assert_ne!(a.id(), b.id());
        assert!(a.id().as_str().starts_with("transfer-"));
    }

    #[test]
    fn result_holds_exactly_one_side() {
        let ok = TaskResult::success(TaskId::from("t"), 7u32, 1);
        assert!(ok.is_success());
        assert_eq!(ok.value(), Some(&7));
        assert!(ok.error().is_none());

        let err: TaskResult<u32> = TaskResult::failure(TaskId::from("t"), ExecError::fail("x"), 6);
        assert!(!err.is_success());
        assert!(err.value().is_none());
        assert_eq!(err.error(), Some(&ExecError::fail("x")));
        assert_eq!(err.attempts(), 6);
    }
}

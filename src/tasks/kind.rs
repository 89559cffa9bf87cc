//! # Task kinds.
//!
//! [`TaskKind`] is the closed set of operations the engine dispatches. Each kind
//! is bound to exactly one [`Handler`](crate::Handler) in a
//! [`HandlerRegistry`](crate::HandlerRegistry); the registry refuses to build
//! if any kind is left unbound.
//!
//! Kinds parse from their snake_case label and from the legacy tags used by
//! earlier task files (`gata_auth`, `balance_check`, `gata_task_loop`).

use std::fmt;
use std::str::FromStr;

use crate::error::RuntimeError;

/// Operation selector for a [`Task`](crate::Task).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    /// One authentication cycle for an account (short, retried).
    Authenticate,
    /// Daily fund transfer for an account (short, retried).
    Transfer,
    /// Balance lookup for an account (short, retried).
    BalanceQuery,
    /// Long-running polling loop for an account (continuous, supervised).
    PollLoop,
}

impl TaskKind {
    /// Every kind, in declaration order.
    pub const ALL: [TaskKind; 4] = [
        TaskKind::Authenticate,
        TaskKind::Transfer,
        TaskKind::BalanceQuery,
        TaskKind::PollLoop,
    ];

    /// Returns a short stable label (snake_case) for use in logs/metrics and ids.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskKind::Authenticate => "authenticate",
            TaskKind::Transfer => "transfer",
            TaskKind::BalanceQuery => "balance_query",
            TaskKind::PollLoop => "poll_loop",
        }
    }

    /// Whether this kind is expected to run indefinitely.
    pub fn is_continuous(&self) -> bool {
        matches!(self, TaskKind::PollLoop)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

impl FromStr for TaskKind {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase();
        match norm.as_str() {
            "authenticate" | "gata_auth" => Ok(TaskKind::Authenticate),
            "transfer" => Ok(TaskKind::Transfer),
            "balance_query" | "balance_check" => Ok(TaskKind::BalanceQuery),
            "poll_loop" | "gata_task_loop" => Ok(TaskKind::PollLoop),
            _ => Err(RuntimeError::UnknownTaskKind { tag: s.to_string() }),
        }
    }
}

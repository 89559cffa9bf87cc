//! # Continuous task lifecycle tracker with sequence-based ordering.
//!
//! Maintains which supervised (continuous) tasks are currently alive, using
//! event sequence numbers to handle out-of-order delivery. The engine consults
//! it when the shutdown grace period runs out to name the stuck tasks.
//!
//! ```text
//! Engine ──► Bus ──► listener ──► AliveTracker::update()
//!                                        │
//!                                        ▼
//!                          HashMap<task id, TaskState{seq, alive}>
//! ```
//!
//! ## Rules
//! - `SupervisorStarting` marks a task alive.
//! - `NormalExit` / `SupervisorTerminated` / `SupervisorCanceled` mark it stopped.
//! - Other events only advance `last_seq` of an already tracked task.
//! - Events with `seq <= last_seq` are **rejected** (stale).

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::events::{Event, EventKind};

#[derive(Debug, Clone)]
struct TaskState {
    last_seq: Option<u64>,
    alive: bool,
}

/// Thread-safe tracker of alive continuous tasks.
pub(crate) struct AliveTracker {
    state: RwLock<HashMap<String, TaskState>>,
}

impl AliveTracker {
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
        }
    }

    /// Applies an event if it is newer than the last one seen for its task.
    ///
    /// Returns `true` when the alive flag was set by this event.
    pub(crate) async fn update(&self, ev: &Event) -> bool {
        let Some(name) = ev.task.as_deref() else {
            return false;
        };
        let alive = match ev.kind {
            EventKind::SupervisorStarting => Some(true),
            EventKind::NormalExit
            | EventKind::SupervisorTerminated
            | EventKind::SupervisorCanceled => Some(false),
            // Subscriber events carry a subscriber name, not a task id.
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => return false,
            _ => None,
        };

        let mut state = self.state.write().await;
        let Some(flag) = alive else {
            // Batch and attempt events must not grow the table.
            if let Some(entry) = state.get_mut(name) {
                entry.last_seq = entry.last_seq.max(Some(ev.seq));
            }
            return false;
        };
        let entry = state.entry(name.to_string()).or_insert(TaskState {
            last_seq: None,
            alive: false,
        });
        if entry.last_seq.is_some_and(|last| ev.seq <= last) {
            return false;
        }
        entry.last_seq = Some(ev.seq);
        entry.alive = flag;
        true
    }

    /// Returns the sorted ids of tasks that started and have not stopped.
    pub(crate) async fn snapshot(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut alive: Vec<String> = state
            .iter()
            .filter(|(_, ts)| ts.alive)
            .map(|(name, _)| name.clone())
            .collect();
        alive.sort_unstable();
        alive
    }

    pub(crate) async fn is_alive(&self, name: &str) -> bool {
        self.state
            .read()
            .await
            .get(name)
            .is_some_and(|ts| ts.alive)
    }
}

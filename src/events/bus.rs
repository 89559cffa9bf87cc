//! # Event bus for broadcasting engine events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking publishing from many sources (runners, supervisors, batches).
//!
//! ## Architecture
//! ```text
//! Publishers (many):                    Listener (one):
//!   retry runner  ──┐
//!   supervisor    ──┼──────► Bus ───────► engine listener ────► AliveTracker
//!   batch         ──┤  (broadcast chan)                   └───► SubscriberSet
//!   engine        ──┘
//! ```
//!
//! `publish()` never blocks and never fails: with no receiver the event is
//! simply gone. A receiver more than `capacity` events behind gets
//! `RecvError::Lagged(n)` and skips the `n` oldest.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for engine events.
///
/// Cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that observes subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

//! # Subscriber trait
//!
//! Implement [`Subscribe`] to receive the engine's lifecycle events: attempt
//! outcomes, retries, restarts, batch progress and shutdown. Typical uses are
//! audit trails per wallet, metrics and alerting on `SupervisorTerminated`.
//!
//! Every subscriber gets its own worker and bounded queue inside the
//! [`SubscriberSet`](crate::subscribers::SubscriberSet). A slow subscriber only
//! delays itself; when its queue is full the event is dropped for it alone and
//! `SubscriberOverflow` is reported. A panic in `on_event` is caught and
//! reported as `SubscriberPanicked`.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use fleetvisor::{Event, EventKind, Subscribe};
//!
//! #[derive(Default)]
//! struct TerminalCounter(AtomicUsize);
//!
//! #[async_trait::async_trait]
//! impl Subscribe for TerminalCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::SupervisorTerminated {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!     fn name(&self) -> &'static str { "terminal-counter" }
//!     fn queue_capacity(&self) -> usize { 256 }
//! }
//! ```

use crate::events::Event;
use async_trait::async_trait;

/// Event subscriber.
///
/// `on_event` runs on the subscriber's worker task, one event at a time, in
/// publication order.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, event: &Event);

    /// Name used in overflow and panic reports.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Capacity of this subscriber's queue (minimum 1).
    fn queue_capacity(&self) -> usize {
        1024
    }
}

//! # Event subscribers.
//!
//! Events published on the [`Bus`](crate::events::Bus) are fanned out by the
//! engine's listener to every registered [`Subscribe`] implementation.
//!
//! ```text
//! Engine ── publish(Event) ──► Bus ──► listener ──► AliveTracker (shutdown bookkeeping)
//!                                          │
//!                                          └──► SubscriberSet::emit(&Event)
//!                                                  ├──► [queue] ──► LogWriter
//!                                                  └──► [queue] ──► custom ...
//! ```
//!
//! - [`Subscribe`]: the extension trait.
//! - [`SubscriberSet`]: bounded per-subscriber queues, panic isolation.
//! - [`LogWriter`]: renders events as `tracing` records (installed by default).

mod log;
mod set;
mod subscribe;

pub use log::{LogWriter, log_event, message_for};
pub use set::SubscriberSet;
pub use subscribe::Subscribe;

//! Engine events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the execution units, the retry runner,
//! the continuous supervisor, the batch scheduler and the engine.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `core::retry`, `core::continuous`, `core::batch`, `Engine`,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the engine listener, which updates `AliveTracker` and fans
//!   out to the `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};

//! Execution core.
//!
//! The only entry point from this module is [`Engine`] (built through
//! [`EngineBuilder`]); the rest are the layers it composes and the value types
//! they report.
//!
//! Internal modules:
//! - [`unit`]: one attempt on its own tokio task, with timeout and panic capture;
//! - [`retry`]: bounded retry loop with exponential backoff over units;
//! - [`continuous`]: restart supervisor for long-running tasks;
//! - [`batch`]: ordered, bounded-concurrency scheduler over retrying runs;
//! - [`alive`]: which continuous tasks are running, from the event stream;
//! - [`shutdown`]: OS termination signals.

mod alive;
mod batch;
mod builder;
mod config;
mod continuous;
mod engine;
mod retry;
mod shutdown;
mod unit;

pub use batch::{BatchReport, ExecutionSlots};
pub use builder::EngineBuilder;
pub use config::EngineConfig;
pub use continuous::{SupervisionReport, SupervisionState, SupervisorPhase};
pub use engine::Engine;
pub use retry::RetryState;

pub(crate) use unit::panic_message;

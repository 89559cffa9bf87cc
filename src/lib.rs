//! # fleetvisor
//!
//! **Fleetvisor** is a concurrent task execution engine for fleets of
//! identities (wallets, accounts, API keys) that each run the same kinds of
//! operations against remote services.
//!
//! It runs short tasks as ordered, bounded-concurrency batches with
//! per-task retries, and long-running tasks (polling loops) under a restart
//! supervisor. Every attempt runs isolated on its own tokio task, so a panic
//! or a hang in one handler never takes down its neighbours.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   Vec<Task<P>>                         Task<P> (continuous)
//!        │                                      │
//!        ▼                                      ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Engine                                                           │
//! │  - HandlerRegistry (TaskKind ─► Handler, validated complete)      │
//! │  - Bus (broadcast events)                                         │
//! │  - AliveTracker (which continuous tasks run, by event seq)        │
//! │  - runtime token (cancelled on shutdown)                          │
//! └──────┬──────────────────────────────────────────┬─────────────────┘
//!        ▼                                          ▼
//! ┌──────────────────────┐                ┌──────────────────────────┐
//! │ batch scheduler      │                │ continuous supervisor    │
//! │ ≤ max_parallel slots │                │ restart with linear      │
//! │ results[i] ↔ task[i] │                │ capped delay             │
//! └──────┬───────────────┘                └──────┬───────────────────┘
//!        ▼                                       │
//! ┌──────────────────────┐                       │
//! │ retry runner         │                       │
//! │ exponential backoff  │                       │
//! └──────┬───────────────┘                       │
//!        ▼                                       ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │ execution unit: tokio::spawn + timeout + panic capture            │
//! └───────────────────────────────────────────────────────────────────┘
//!        │ every layer publishes Events
//!        ▼
//!   Bus ──► listener ──► AliveTracker
//!                   └──► SubscriberSet ──► LogWriter, user subscribers
//! ```
//!
//! ## Features
//! | Area              | Description                                                 | Key types / traits                          |
//! |-------------------|-------------------------------------------------------------|---------------------------------------------|
//! | **Engine**        | Batches, continuous tasks, graceful shutdown.               | [`Engine`], [`EngineBuilder`]               |
//! | **Tasks**         | Task kinds, payloads, handlers and their registry.          | [`Task`], [`Handler`], [`HandlerRegistry`]  |
//! | **Policies**      | Retry, restart and launch-stagger timing.                   | [`RetryPolicy`], [`RestartPolicy`]          |
//! | **Results**       | Ordered batch results, supervision reports.                 | [`BatchReport`], [`SupervisionReport`]      |
//! | **Errors**        | Per-task failures and engine-level errors.                  | [`ExecError`], [`RuntimeError`]             |
//! | **Subscriber API**| Hook into lifecycle events.                                 | [`Subscribe`], [`Event`]                    |
//! | **Configuration** | Central engine settings.                                    | [`EngineConfig`]                            |
//!
//! ## Optional features
//! - `logging` (default): [`logger_init`] installs a text or JSON `tracing`
//!   formatter for the [`LogWriter`] output.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use fleetvisor::{
//!     Engine, EngineConfig, ExecError, HandlerFn, HandlerRegistry, RetryPolicy, Task, TaskKind,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = EngineConfig {
//!         max_parallel: 2,
//!         retry: RetryPolicy::exponential(2, Duration::from_millis(10)),
//!         ..EngineConfig::default()
//!     };
//!
//!     let query = HandlerFn::arc("query", |wallet: &'static str, ctx: CancellationToken| async move {
//!         if ctx.is_cancelled() {
//!             return Err(ExecError::Canceled);
//!         }
//!         Ok(format!("{wallet}: 42"))
//!     });
//!     let registry = HandlerRegistry::builder()
//!         .register_each(TaskKind::ALL, query)
//!         .build()?;
//!
//!     let engine = Engine::builder(cfg, registry).build();
//!     let tasks = ["0xa1", "0xb2", "0xc3"]
//!         .into_iter()
//!         .map(|wallet| Task::new(TaskKind::BalanceQuery, wallet))
//!         .collect();
//!
//!     let report = engine.execute_batch(tasks, None).await;
//!     assert!(report.all_succeeded());
//!     assert_eq!(report.results[2].value().map(String::as_str), Some("0xc3: 42"));
//!
//!     engine.shutdown().await?;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod policies;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use core::{
    BatchReport, Engine, EngineBuilder, EngineConfig, ExecutionSlots, RetryState,
    SupervisionReport, SupervisionState, SupervisorPhase,
};
pub use error::{ExecError, RuntimeError};
pub use events::{Bus, Event, EventKind};
pub use policies::{JitterPolicy, RestartPolicy, RetryPolicy, StaggerPolicy};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet, log_event, message_for};
pub use tasks::{
    Handler, HandlerFn, HandlerRef, HandlerRegistry, HandlerRegistryBuilder, Task, TaskId,
    TaskKind, TaskResult,
};

// Optional: process-wide tracing formatter.
// Enable with: `--features logging` (on by default)
#[cfg(feature = "logging")]
mod logger;
#[cfg(feature = "logging")]
pub use logger::{FORMAT_ENV, LEVEL_ENV, LoggerConfig, LoggerError, LoggerFormat, logger_init};

//! # Task abstractions and handler dispatch.
//!
//! This module provides the task-related types:
//! - [`TaskKind`] - closed set of operations the engine can dispatch
//! - [`Task`] / [`TaskId`] - one submitted unit of work
//! - [`TaskResult`] - outcome of one task, value or error
//! - [`Handler`] / [`HandlerFn`] / [`HandlerRef`] - the collaborator contract
//! - [`HandlerRegistry`] - kind → handler table, validated for completeness

mod handler;
mod kind;
mod registry;
mod task;

pub use handler::{Handler, HandlerFn, HandlerRef};
pub use kind::TaskKind;
pub use registry::{HandlerRegistry, HandlerRegistryBuilder};
pub use task::{Task, TaskId, TaskResult};

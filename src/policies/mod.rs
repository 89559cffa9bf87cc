//! Retry, restart and launch policies.
//!
//! This module groups the knobs that control **if/when** work is attempted again
//! and **how long** to wait in between.
//!
//! ## Contents
//! - [`RetryPolicy`]   bounded retries of short tasks, exponential delay (`base × factor^attempt`)
//! - [`RestartPolicy`] restart ceiling of continuous tasks, linear capped delay
//! - [`JitterPolicy`]  randomization strategy to avoid thundering herd
//! - [`StaggerPolicy`] random pause between launches of continuous tasks
//!
//! ## Quick wiring
//! ```text
//! EngineConfig { retry: RetryPolicy, restart: RestartPolicy, .. }
//!      ├─► core::retry      uses retry.delay(attempt) between attempts
//!      ├─► core::continuous uses restart.delay(restart_count) between restarts
//!      └─► Engine::launch_staggered uses stagger.sample() between launches
//! ```
//!
//! ## Defaults
//! - `RetryPolicy::default()`   → 5 retries, base=1s, factor=2.0 (1s, 2s, 4s, 8s, 16s), jitter=None.
//! - `RestartPolicy::default()` → 100 restarts, 30s + 5s per restart, capped at 120s.
//! - `StaggerPolicy::default()` → uniform pause in [10s, 20s].

mod jitter;
mod restart;
mod retry;
mod stagger;

pub use jitter::JitterPolicy;
pub use restart::RestartPolicy;
pub use retry::RetryPolicy;
pub use stagger::StaggerPolicy;

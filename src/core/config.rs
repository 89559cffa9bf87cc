//! # Engine configuration.
//!
//! [`EngineConfig`] centralizes the settings shared by every call on an
//! [`Engine`](crate::Engine).
//!
//! ## Sentinel values
//! - `max_parallel = 0` → available hardware parallelism
//! - `unit_timeout = 0s` → no per-attempt timeout
//!
//! Prefer the helper accessors over sprinkling sentinel checks across the code.

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::policies::{RestartPolicy, RetryPolicy};

/// Global configuration for the engine.
///
/// ## Field semantics
/// - `max_parallel`: default batch concurrency ceiling (`0` = hardware parallelism)
/// - `retry`: retry policy applied to every batch task
/// - `restart`: default restart policy for continuous tasks (overridable per call)
/// - `unit_timeout`: per-attempt timeout of batch tasks (`0s` = none)
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `grace`: how long [`Engine::shutdown`](crate::Engine::shutdown) waits for
///   background continuous tasks
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Default ceiling on units in flight within one batch call.
    ///
    /// - `0` = [`std::thread::available_parallelism`]
    /// - `n > 0` = at most `n` units at once
    pub max_parallel: usize,

    /// Retry policy for short (batch) tasks.
    pub retry: RetryPolicy,

    /// Default restart policy for continuous tasks.
    pub restart: RestartPolicy,

    /// Per-attempt timeout of batch tasks; continuous tasks are not limited.
    ///
    /// - `Duration::ZERO` = attempts run until they return
    /// - `> 0` = attempt is cancelled and reported as `ExecError::Timeout`
    pub unit_timeout: Duration,

    /// Capacity of the event bus broadcast channel.
    ///
    /// Subscribers lagging behind by more than this many events skip the oldest.
    pub bus_capacity: usize,

    /// Maximum wait for background continuous tasks after cancellation.
    pub grace: Duration,
}

impl EngineConfig {
    /// Resolves the `0` sentinel of [`EngineConfig::max_parallel`].
    #[inline]
    pub fn parallelism(&self) -> usize {
        resolve_ceiling(self.max_parallel)
    }

    /// Returns the ceiling for one batch call: the override when given,
    /// otherwise the configured default. `Some(0)` also means hardware parallelism.
    #[inline]
    pub fn resolve_parallel(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(n) => resolve_ceiling(n),
            None => self.parallelism(),
        }
    }

    /// Returns the per-attempt timeout as an `Option`.
    #[inline]
    pub fn unit_timeout(&self) -> Option<Duration> {
        if self.unit_timeout.is_zero() {
            None
        } else {
            Some(self.unit_timeout)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

fn resolve_ceiling(n: usize) -> usize {
    if n > 0 {
        return n;
    }
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

impl Default for EngineConfig {
    /// Default configuration:
    ///
    /// - `max_parallel = 0` (hardware parallelism)
    /// - `retry = RetryPolicy::default()` (5 retries, 1s doubling)
    /// - `restart = RestartPolicy::default()` (30s + 5s per restart, max 120s, 100 restarts)
    /// - `unit_timeout = 0s` (no timeout)
    /// - `bus_capacity = 1024`
    /// - `grace = 60s`
    fn default() -> Self {
        Self {
            max_parallel: 0,
            retry: RetryPolicy::default(),
            restart: RestartPolicy::default(),
            unit_timeout: Duration::ZERO,
            bus_capacity: 1024,
            grace: Duration::from_secs(60),
        }
    }
}

//! # Launch stagger for continuous tasks.
//!
//! Starting one polling loop per identity at the same instant makes every
//! identity log in together. [`StaggerPolicy`] samples a uniform pause in
//! `[min, max]` that [`Engine::launch_staggered`](crate::Engine::launch_staggered)
//! waits between consecutive launches.

use rand::Rng;
use std::time::Duration;

/// Uniform random pause between launches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StaggerPolicy {
    /// Shortest pause.
    pub min: Duration,
    /// Longest pause (values below `min` are treated as `min`).
    pub max: Duration,
}

impl Default for StaggerPolicy {
    /// Returns a pause in [10s, 20s].
    fn default() -> Self {
        Self {
            min: Duration::from_secs(10),
            max: Duration::from_secs(20),
        }
    }
}

impl StaggerPolicy {
    /// Fixed pause (`min == max`).
    pub fn fixed(pause: Duration) -> Self {
        Self {
            min: pause,
            max: pause,
        }
    }

    /// No pause between launches.
    pub fn none() -> Self {
        Self::fixed(Duration::ZERO)
    }

    /// Samples one pause.
    pub fn sample(&self) -> Duration {
        let min_ms = self.min.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = (self.max.as_millis().min(u128::from(u64::MAX)) as u64).max(min_ms);
        if min_ms == max_ms {
            return self.min;
        }
        Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
    }
}

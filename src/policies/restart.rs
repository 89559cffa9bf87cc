//! # Restart policy for continuous tasks.
//!
//! [`RestartPolicy`] controls how a long-running task is brought back after an
//! abnormal exit. The delay grows **linearly** with the restart count and is
//! capped:
//!
//! ```text
//! delay(n) = min(base_delay + n × increment, max_delay)
//!
//! defaults:  n=0 → 30s, n=1 → 35s, ..., n≥18 → 120s
//! ```
//!
//! Re-initializing a continuous task (login, proxy warm-up) is expensive and
//! restarts are expected to be rare, hence the long linear schedule rather than
//! the exponential one used for short retries.
//!
//! After `max_restarts` restarts the next abnormal exit is terminal.

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Restart ceiling and linear backoff for continuous supervision.
#[derive(Clone, Copy, Debug)]
pub struct RestartPolicy {
    /// Maximum number of automatic restarts.
    pub max_restarts: u32,
    /// Delay before the first restart.
    pub base_delay: Duration,
    /// Added to the delay for every restart already performed.
    pub increment: Duration,
    /// Upper bound of a single restart delay.
    pub max_delay: Duration,
    /// Jitter applied to the computed delay.
    pub jitter: JitterPolicy,
}

impl Default for RestartPolicy {
    /// Returns 100 restarts, 30s base, +5s per restart, capped at 120s, no jitter.
    fn default() -> Self {
        Self {
            max_restarts: 100,
            base_delay: Duration::from_secs(30),
            increment: Duration::from_secs(5),
            max_delay: Duration::from_secs(120),
            jitter: JitterPolicy::None,
        }
    }
}

impl RestartPolicy {
    /// Returns a new policy with the given restart ceiling.
    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    /// Returns a new policy with the given jitter.
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Computes the delay before restart number `restart_count + 1`.
    pub fn delay(&self, restart_count: u32) -> Duration {
        let grown = self
            .increment
            .checked_mul(restart_count)
            .and_then(|inc| self.base_delay.checked_add(inc))
            .unwrap_or(Duration::MAX);
        self.jitter.apply(grown.min(self.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_growth_from_base() {
        let policy = RestartPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(30));
        assert_eq!(policy.delay(1), Duration::from_secs(35));
        assert_eq!(policy.delay(4), Duration::from_secs(50));
    }

    #[test]
    fn capped_at_max_delay() {
        let policy = RestartPolicy::default();
        assert_eq!(policy.delay(18), Duration::from_secs(120));
        assert_eq!(policy.delay(99), Duration::from_secs(120));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(120));
    }

    #[test]
    fn defaults_match_fleet_behavior() {
        let policy = RestartPolicy::default();
        assert_eq!(policy.max_restarts, 100);
        assert_eq!(policy.with_max_restarts(3).max_restarts, 3);
    }
}

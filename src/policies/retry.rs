//! # Retry policy for short tasks.
//!
//! [`RetryPolicy`] bounds how often a failing short task (one authentication
//! cycle, one balance query) is attempted again and how long to wait in between.
//!
//! The delay after failed attempt `n` (0-indexed) is `base_delay × factor^n`.
//! Growth is uncapped unless [`RetryPolicy::max_delay`] is set; the number of
//! retries is what bounds the total wait. A task that always fails runs exactly
//! `max_attempts + 1` times.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use fleetvisor::{JitterPolicy, RetryPolicy};
//!
//! let retry = RetryPolicy {
//!     max_attempts: 5,
//!     base_delay: Duration::from_secs(1),
//!     factor: 2.0,
//!     max_delay: None,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(retry.delay(0), Duration::from_secs(1));
//! assert_eq!(retry.delay(1), Duration::from_secs(2));
//! assert_eq!(retry.delay(4), Duration::from_secs(16));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Bounded exponential retry policy.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt (`0` = run once).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplicative growth factor (`2.0` doubles each time).
    pub factor: f64,
    /// Optional cap on a single delay (`None` = uncapped).
    pub max_delay: Option<Duration>,
    /// Jitter applied to the computed delay.
    pub jitter: JitterPolicy,
}

impl Default for RetryPolicy {
    /// Returns a policy with:
    /// - `max_attempts = 5`;
    /// - `base_delay = 1s`, `factor = 2.0` (1s, 2s, 4s, 8s, 16s);
    /// - no cap, no jitter.
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            factor: 2.0,
            max_delay: None,
            jitter: JitterPolicy::None,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn never() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Exponential policy doubling from `base_delay`, without cap or jitter.
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Self::default()
        }
    }

    /// Returns a new policy with the given jitter.
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Computes the delay after failed attempt `attempt` (0-indexed).
    ///
    /// Non-finite or overflowing results saturate to `max_delay` (or `Duration::MAX`).
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.max_delay.unwrap_or(Duration::MAX);
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 {
            ceiling
        } else {
            Duration::try_from_secs_f64(secs)
                .unwrap_or(Duration::MAX)
                .min(ceiling)
        };
        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_doubles_from_one_second() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (0..5).map(|a| policy.delay(a)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(16),
            ]
        );
    }

    #[test]
    fn delays_increase_monotonically() {
        let policy = RetryPolicy::exponential(10, Duration::from_millis(100));
        for attempt in 0..10 {
            assert!(policy.delay(attempt + 1) > policy.delay(attempt));
        }
    }

    #[test]
    fn cap_applies_when_set() {
        let policy = RetryPolicy {
            max_delay: Some(Duration::from_secs(5)),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay(3), Duration::from_secs(5));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
    }

    #[test]
    fn huge_attempt_saturates() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(u32::MAX), Duration::MAX);
    }

    #[test]
    fn never_has_no_retries() {
        assert_eq!(RetryPolicy::never().max_attempts, 0);
    }
}

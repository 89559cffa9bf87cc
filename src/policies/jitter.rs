//! # Jitter policy for retry and restart delays.
//!
//! [`JitterPolicy`] adds randomness to computed delays so that many identities
//! failing together (one shared upstream outage) do not retry in lockstep.
//!
//! | Policy  | Result                  |
//! |---------|-------------------------|
//! | `None`  | `delay`                 |
//! | `Full`  | uniform in `[0, delay]` |
//! | `Equal` | uniform in `[delay/2, delay]` |

use rand::Rng;
use std::time::Duration;

/// Policy controlling randomization of computed delays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Exact computed delay.
    #[default]
    None,

    /// Anywhere between zero and the computed delay.
    Full,

    /// At least half of the computed delay.
    Equal,
}

impl JitterPolicy {
    /// Applies jitter to the given delay.
    pub fn apply(&self, delay: Duration) -> Duration {
        let ms = clamp_millis(delay);
        let floor = match self {
            JitterPolicy::None => return delay,
            JitterPolicy::Full => 0,
            JitterPolicy::Equal => ms / 2,
        };
        if ms == 0 {
            return Duration::from_millis(ms);
        }
        Duration::from_millis(rand::rng().random_range(floor..=ms))
    }
}

fn clamp_millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_identity() {
        let d = Duration::from_micros(1_234_567);
        assert_eq!(JitterPolicy::None.apply(d), d);
    }

    #[test]
    fn one_millisecond_equal_jitter_stays_in_range() {
        for _ in 0..50 {
            let delay = JitterPolicy::Equal.apply(Duration::from_millis(1));
            assert!(delay <= Duration::from_millis(1));
        }
    }

    #[test]
    fn full_jitter_bounds() {
        for _ in 0..200 {
            assert!(JitterPolicy::Full.apply(Duration::from_millis(1000)) <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn equal_jitter_bounds() {
        for _ in 0..200 {
            let delay = JitterPolicy::Equal.apply(Duration::from_millis(1000));
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn zero_stays_zero() {
        assert_eq!(JitterPolicy::Full.apply(Duration::ZERO), Duration::ZERO);
        assert_eq!(JitterPolicy::Equal.apply(Duration::ZERO), Duration::ZERO);
    }
}

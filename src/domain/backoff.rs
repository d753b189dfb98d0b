//! Exponential reconnect backoff.
//!
//! `delay(n) = min(base * 2^n, max)`. The attempt counter saturates at
//! `MAX_BACKOFF_EXPONENT` so it never grows without bound.

use std::time::Duration;

/// Highest exponent the attempt counter reaches.
pub const MAX_BACKOFF_EXPONENT: u32 = 8;

/// Reconnect delay policy shared by both feed connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub base: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
}

impl BackoffPolicy {
    /// Create a policy. `max` is raised to `base` if it is smaller.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Delay to wait before reconnecting after `attempt` prior failures.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_BACKOFF_EXPONENT);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Counter value after one more failure.
    pub fn next_attempt(&self, attempt: u32) -> u32 {
        attempt.saturating_add(1).min(MAX_BACKOFF_EXPONENT)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(1_000), Duration::from_millis(15_000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_until_cap() {
        let p = BackoffPolicy::default();
        let delays: Vec<u64> = (0..6).map(|n| p.delay(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 15_000, 15_000]);
    }

    #[test]
    fn test_attempt_saturates() {
        let p = BackoffPolicy::default();
        let mut attempt = 0;
        for _ in 0..100 {
            attempt = p.next_attempt(attempt);
        }
        assert_eq!(attempt, MAX_BACKOFF_EXPONENT);
        assert_eq!(p.delay(u32::MAX), p.max);
    }

    #[test]
    fn test_max_below_base_is_raised() {
        let p = BackoffPolicy::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(p.delay(0), Duration::from_secs(5));
        assert_eq!(p.delay(3), Duration::from_secs(5));
    }
}

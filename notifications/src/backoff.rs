//! Exponential backoff used when re-establishing broker subscriptions.

use std::time::Duration;

const MIN_BASE_DELAY: Duration = Duration::from_millis(1);

/// Retries with exponentially increasing delays, capped at a maximum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    base_delay: Duration,
    max_delay: Duration,
}

impl Backoff {
    /// A zero `base_delay` is raised to one millisecond so retries never spin.
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        let base_delay = base_delay.max(MIN_BASE_DELAY);
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Delay before retry number `attempt` (zero based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(2_u32.saturating_pow(attempt))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_delay() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));

        assert_eq!(backoff.delay(0).as_secs(), 1);
        assert_eq!(backoff.delay(1).as_secs(), 2);
        assert_eq!(backoff.delay(2).as_secs(), 4);
    }

    #[test]
    fn test_max_delay_cap() {
        let backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(30));

        assert_eq!(backoff.delay(10), Duration::from_secs(30));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_base_still_waits() {
        let backoff = Backoff::new(Duration::ZERO, Duration::from_secs(30));

        assert_eq!(backoff.delay(0), Duration::from_millis(1));
        assert_eq!(backoff.delay(1), Duration::from_millis(2));
    }

    #[test]
    fn test_huge_max_delay_does_not_overflow() {
        let backoff = Backoff::new(Duration::from_secs(u64::MAX / 2), Duration::MAX);

        assert_eq!(backoff.delay(0), Duration::from_secs(u64::MAX / 2));
        assert_eq!(backoff.delay(5), Duration::MAX);
        assert_eq!(backoff.delay(u32::MAX), Duration::MAX);
    }

    #[test]
    fn test_max_never_below_base() {
        let backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(1));

        assert_eq!(backoff.delay(0), Duration::from_secs(5));
    }
}

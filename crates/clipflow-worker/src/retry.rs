//! Backoff schedule shared by the classifier and the strategy cascade, and
//! log suppression for the polling loops.

use std::time::Duration;
use tracing::{debug, warn};

/// Capped exponential backoff: try `n` (0-based) waits `base * 2^n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first failure
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self
        }
    }

    pub fn with_base_delay(self, base_delay: Duration) -> Self {
        Self { base_delay, ..self }
    }

    pub fn with_max_delay(self, max_delay: Duration) -> Self {
        Self { max_delay, ..self }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // 2^31 already overshoots any sane cap
        let multiplier = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(multiplier).min(self.max_delay)
    }
}

/// Counts consecutive failures of a periodic pass and says whether the
/// next one is still worth an error line.
#[derive(Debug, Default)]
pub struct FailureTracker {
    streak: u32,
    log_limit: u32,
}

impl FailureTracker {
    pub fn new(log_limit: u32) -> Self {
        Self {
            streak: 0,
            log_limit,
        }
    }

    pub fn record_success(&mut self) {
        if self.streak > self.log_limit {
            debug!(streak = self.streak, "Recovered after suppressed failures");
        }
        self.streak = 0;
    }

    /// `true` while the streak is short enough to log.
    pub fn record_failure(&mut self) -> bool {
        self.streak = self.streak.saturating_add(1);
        if self.streak == self.log_limit + 1 {
            warn!(
                limit = self.log_limit,
                "Repeated failures, further errors are suppressed until a pass succeeds"
            );
        }
        self.streak <= self.log_limit
    }

    pub fn failure_count(&self) -> u32 {
        self.streak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles() {
        let config = RetryConfig::default().with_base_delay(Duration::from_millis(250));
        let delays: Vec<_> = (0..4).map(|n| config.delay_for_attempt(n)).collect();
        assert_eq!(
            delays,
            [250, 500, 1000, 2000].map(Duration::from_millis).to_vec()
        );
    }

    #[test]
    fn test_delay_capped() {
        let config = RetryConfig::default().with_max_delay(Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(64), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_base_never_waits() {
        let config = RetryConfig::default().with_base_delay(Duration::ZERO);
        assert_eq!(config.delay_for_attempt(5), Duration::ZERO);
    }

    #[test]
    fn test_failure_tracker_suppression() {
        let mut tracker = FailureTracker::new(2);
        let logged: Vec<bool> = (0..4).map(|_| tracker.record_failure()).collect();
        assert_eq!(logged, vec![true, true, false, false]);

        tracker.record_success();
        assert_eq!(tracker.failure_count(), 0);
        assert!(tracker.record_failure());
    }
}

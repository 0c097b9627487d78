//! Exponential backoff policies
//!
//! Pure delay arithmetic, kept apart from the loops that sleep on it.

use pulse_config::BackoffConfig;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub factor: f64,
    pub max: Duration,
    /// Total attempts allowed; `None` is unbounded
    pub max_attempts: Option<u32>,
}

impl Backoff {
    pub fn new(initial: Duration, factor: f64, max: Duration) -> Self {
        Self {
            initial,
            factor,
            max,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Delay before the first retry
    pub fn first(&self) -> Duration {
        self.initial.min(self.max)
    }

    /// Delay following `previous`, see [`BackoffConfig::next_delay_ms`]
    pub fn next(&self, previous: Duration) -> Duration {
        let previous_ms = u64::try_from(previous.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(self.config().next_delay_ms(previous_ms))
    }

    /// Millisecond form of this policy
    fn config(&self) -> BackoffConfig {
        BackoffConfig {
            initial_ms: u64::try_from(self.initial.as_millis()).unwrap_or(u64::MAX),
            factor: self.factor,
            max_ms: u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX),
            max_attempts: self.max_attempts,
        }
    }

    /// Whether attempt number `attempt` (1-based) may run
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }

    /// Infinite sequence of delays starting at [`Backoff::first`]
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let policy = *self;
        std::iter::successors(Some(policy.first()), move |d| Some(policy.next(*d)))
    }
}

impl From<&BackoffConfig> for Backoff {
    fn from(config: &BackoffConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_ms),
            factor: config.factor,
            max: Duration::from_millis(config.max_ms),
            max_attempts: config.max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(policy: &Backoff, n: usize) -> Vec<u64> {
        policy
            .delays()
            .take(n)
            .map(|d| d.as_millis() as u64)
            .collect()
    }

    #[test]
    fn test_submission_delays() {
        let policy = Backoff::from(&BackoffConfig::submission());
        assert_eq!(millis(&policy, 5), vec![1_200, 2_040, 3_468, 5_895, 10_000]);
        assert!(policy.allows(4));
        assert!(!policy.allows(5));
    }

    #[test]
    fn test_polling_delays() {
        let policy = Backoff::from(&BackoffConfig::polling());
        assert_eq!(
            millis(&policy, 8),
            // 2800 * 1.4 lands just below 3920 in binary floating point
            vec![2_000, 2_800, 3_919, 5_486, 7_680, 10_752, 15_000, 15_000]
        );
        assert!(policy.allows(u32::MAX));
    }

    #[test]
    fn test_retry_wait_matches_validation() {
        let config = BackoffConfig::submission();
        let policy = Backoff::from(&config);
        let slept: u64 = millis(&policy, 3).iter().sum();
        assert_eq!(slept, pulse_config::ConfigValidator::submission_wait_ms(&config));
    }

    #[test]
    fn test_initial_above_cap() {
        let policy = Backoff::new(Duration::from_secs(20), 2.0, Duration::from_secs(5));
        assert_eq!(policy.first(), Duration::from_secs(5));
        assert_eq!(policy.next(policy.first()), Duration::from_secs(5));
    }

    #[test]
    fn test_attempt_limit() {
        let policy = Backoff::new(Duration::from_millis(10), 1.5, Duration::from_secs(1))
            .with_max_attempts(2);
        assert!(policy.allows(1));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
    }
}

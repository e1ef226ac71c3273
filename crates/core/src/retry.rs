use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How retry delays grow across attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base × 2^attempt
    Exponential,
    /// delay = base for every attempt
    Fixed,
}

/// Named retry policy applied by the job scheduler.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first execution.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_ms: 1_000,
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    /// Delay before re-running attempt `attempt` (0-based: the delay after
    /// the first failure is `delay_for_attempt(0)`).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let ms = match self.strategy {
            BackoffStrategy::Exponential => {
                self.backoff_base_ms.saturating_mul(1u64 << attempt.min(20))
            }
            BackoffStrategy::Fixed => self.backoff_base_ms,
        };
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff_base_ms: 500,
            strategy: BackoffStrategy::Exponential,
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4_000));
    }

    #[test]
    fn test_fixed_backoff_is_constant() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_base_ms: 250,
            strategy: BackoffStrategy::Fixed,
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(250));
    }

    #[test]
    fn test_exponential_backoff_saturates() {
        let policy = RetryPolicy {
            max_attempts: 100,
            backoff_base_ms: u64::MAX / 2,
            strategy: BackoffStrategy::Exponential,
        };
        // Must not overflow for large attempt counts.
        let _ = policy.delay_for_attempt(64);
    }
}

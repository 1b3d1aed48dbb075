use std::time::Duration;

/// Exponential backoff policy for transient upstream failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first failed attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound for any computed delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// A policy that never waits, for tests and local mocks
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`, capped
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Backoff state of one fetch loop
///
/// Each paginator owns its own `Backoff`, so a rate-limited hashtag never
/// slows down the feeds of unrelated hashtags.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    consecutive_failures: u32,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            consecutive_failures: 0,
        }
    }

    /// Records a transient failure and returns how long to wait before retrying
    ///
    /// # Arguments
    ///
    /// * `hint` - Server-provided `Retry-After`, used when longer than the computed delay
    ///
    /// # Returns
    ///
    /// * `Some(delay)` - Retry after `delay`
    /// * `None` - The retry ceiling is exhausted
    pub fn next_delay(&mut self, hint: Option<Duration>) -> Option<Duration> {
        self.consecutive_failures += 1;

        if self.consecutive_failures > self.policy.max_retries {
            return None;
        }

        let computed = self.policy.delay_for(self.consecutive_failures);
        Some(match hint {
            Some(hint) if hint > computed => hint,
            _ => computed,
        })
    }

    /// Clears the failure streak after a successful request
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Number of attempts made in the current failure streak
    pub fn attempts(&self) -> u32 {
        self.consecutive_failures
    }
}

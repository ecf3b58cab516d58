use bon::Builder;
use std::time::Duration;

/// Retry budget for a single grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
pub struct RetryPolicy {
    /// Total calls allowed for a pair that keeps failing with provider errors.
    #[builder(default = 3)]
    pub max_attempts: u32,
    /// How many provider rate-limit pauses a pair may sit through before it is given up.
    #[builder(default = 5)]
    pub max_rate_limit_waits: u32,
    #[builder(default = Duration::from_secs(60))]
    pub base_delay: Duration,
    #[builder(default = Duration::from_secs(15 * 60))]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_rate_limit_waits: 5,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(15 * 60),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `failed_attempts`-th provider error: `base * 2^(n-1)`, capped.
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

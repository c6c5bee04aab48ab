//! Retry policy: decides redelivery backoff.

use std::time::Duration;

/// Backoff for failed entries: `base_delay * multiplier^(attempts - 1)`.
///
/// With base_delay=2s, multiplier=2.0:
/// - attempt 1 (first failure): 2s
/// - attempt 2: 4s
/// - attempt 3: 8s
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    /// Deliveries before an entry is dead-lettered.
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    pub fn new(base_delay: Duration, multiplier: f64, max_attempts: u32) -> Self {
        Self {
            base_delay,
            multiplier,
            max_attempts,
        }
    }

    /// Redeliver at once; for tests and local runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(Duration::ZERO, 1.0, max_attempts)
    }

    /// `attempts` is 1-indexed; 0 is treated as 1.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let delay_secs = base_secs * self.multiplier.powi(attempts.saturating_sub(1) as i32);
        Duration::try_from_secs_f64(delay_secs).unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), 2.0, Self::DEFAULT_MAX_ATTEMPTS)
    }
}

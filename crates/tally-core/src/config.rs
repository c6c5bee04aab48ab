//! Job configuration with sane defaults, overridable from the environment.

use std::str::FromStr;
use std::time::Duration;

use crate::queue::RetryPolicy;

/// Upper bound for `TALLY_SUMMARY_STALE_DAYS`; larger values fall back to the default.
const MAX_STALE_DAYS: i64 = 3650;
const MAX_LOCK_WAIT_MS: u64 = 60 * 60 * 1000;
const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Tunables for the daily summary job.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryConfig {
    pub enabled: bool,
    /// Projects claimed per batch.
    pub batch_size: usize,
    /// Hours past the end-of-day boundary before a project is due.
    pub trigger_offset_hours: u32,
    /// Windows starting longer ago than this are skipped.
    pub stale_after: chrono::Duration,
    /// Bounded wait for the global job lock.
    pub lock_wait: Duration,
    /// Period of `run_forever`.
    pub interval: Duration,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 25,
            trigger_offset_hours: 9,
            stale_after: chrono::Duration::days(2),
            lock_wait: Duration::from_secs(5),
            interval: Duration::from_secs(15 * 60),
        }
    }
}

impl SummaryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Missing or unparsable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let enabled = lookup("TALLY_SUMMARY_ENABLED")
            .and_then(|v| parse_flag(&v))
            .unwrap_or(defaults.enabled);
        let batch_size = parse_or(&lookup, "TALLY_SUMMARY_BATCH_SIZE", defaults.batch_size).max(1);
        let trigger_offset_hours = parse_or(
            &lookup,
            "TALLY_SUMMARY_TRIGGER_HOUR",
            defaults.trigger_offset_hours,
        )
        .min(23);
        let stale_after = lookup("TALLY_SUMMARY_STALE_DAYS")
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|days| (0..=MAX_STALE_DAYS).contains(days))
            .and_then(chrono::Duration::try_days)
            .unwrap_or(defaults.stale_after);
        let lock_wait_ms: u64 = parse_or(&lookup, "TALLY_SUMMARY_LOCK_WAIT_MS", 5_000);
        let interval_secs: u64 = parse_or(&lookup, "TALLY_SUMMARY_INTERVAL_SECS", 15 * 60);
        Self {
            enabled,
            batch_size,
            trigger_offset_hours,
            stale_after,
            lock_wait: Duration::from_millis(lock_wait_ms.min(MAX_LOCK_WAIT_MS)),
            interval: Duration::from_secs(interval_secs.clamp(1, MAX_INTERVAL_SECS)),
        }
    }
}

/// Consumer side of the description queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    pub consumers: usize,
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_multiplier: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            consumers: 4,
            max_attempts: RetryPolicy::DEFAULT_MAX_ATTEMPTS,
            retry_base_delay: Duration::from_secs(2),
            retry_multiplier: 2.0,
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let retry_base_ms: u64 = parse_or(&lookup, "TALLY_QUEUE_RETRY_BASE_MS", 2_000);
        Self {
            consumers: parse_or(&lookup, "TALLY_QUEUE_CONSUMERS", defaults.consumers).max(1),
            max_attempts: parse_or(&lookup, "TALLY_QUEUE_MAX_ATTEMPTS", defaults.max_attempts)
                .max(1),
            retry_base_delay: Duration::from_millis(retry_base_ms),
            retry_multiplier: defaults.retry_multiplier,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_base_delay,
            self.retry_multiplier,
            self.max_attempts,
        )
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

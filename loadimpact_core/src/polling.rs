//! Poll pacing and failure tracking.
//!
//! The result streams sleep a fixed interval between cycles while the API
//! answers. When transport failures are tolerated, consecutive failures
//! stretch the sleep with exponential backoff and eventually give up, so a
//! dead endpoint never keeps a stream spinning forever.

use std::time::Duration;

/// Exponential backoff applied to the poll interval after failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Base interval in milliseconds (default: 3000ms, the stream poll interval)
    pub base_interval_ms: u64,
    /// Upper bound on a single delay in milliseconds (default: 60s)
    pub max_backoff_ms: u64,
    /// Largest doubling exponent (default: 4, so at most 16x the base)
    pub max_exponent: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 3000,
            max_backoff_ms: 60000,
            max_exponent: 4,
        }
    }
}

impl BackoffConfig {
    pub fn new(base_interval_ms: u64, max_backoff_ms: u64, max_exponent: u32) -> Self {
        Self {
            base_interval_ms,
            max_backoff_ms,
            max_exponent,
        }
    }

    /// Backoff starting from the given poll interval, keeping the default cap.
    pub fn from_interval(interval: Duration) -> Self {
        let base = interval.as_millis().min(u64::MAX as u128) as u64;
        Self {
            base_interval_ms: base,
            max_backoff_ms: Self::default().max_backoff_ms.max(base),
            ..Self::default()
        }
    }
}

/// Delay after `consecutive_failures` failures in a row.
///
/// Formula: `min(base * 2^min(consecutive-1, max_exponent), max_backoff)`
///
/// # Example
///
/// ```
/// use loadimpact_core::polling::{BackoffConfig, calculate_backoff};
///
/// let config = BackoffConfig::default();
///
/// assert_eq!(calculate_backoff(&config, 1).as_millis(), 3000);
/// assert_eq!(calculate_backoff(&config, 2).as_millis(), 6000);
/// assert_eq!(calculate_backoff(&config, 3).as_millis(), 12000);
/// ```
pub fn calculate_backoff(config: &BackoffConfig, consecutive_failures: u32) -> Duration {
    if consecutive_failures == 0 {
        return Duration::from_millis(config.base_interval_ms);
    }

    let exponent = (consecutive_failures.saturating_sub(1)).min(config.max_exponent);
    let multiplier = 2u64.saturating_pow(exponent);
    let delay_ms = config
        .base_interval_ms
        .saturating_mul(multiplier)
        .min(config.max_backoff_ms);

    Duration::from_millis(delay_ms)
}

/// Pacing and failure budget of a stream's poll loop.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Backoff applied after failures
    pub backoff: BackoffConfig,
    /// Consecutive failures tolerated before giving up
    pub max_consecutive_errors: u32,
    /// Delay between healthy polls
    pub poll_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            max_consecutive_errors: 10,
            poll_interval: Duration::from_secs(3),
        }
    }
}

impl PollConfig {
    /// Config for a fixed interval, with backoff starting at that interval.
    pub fn with_interval(poll_interval: Duration, max_consecutive_errors: u32) -> Self {
        Self {
            backoff: BackoffConfig::from_interval(poll_interval),
            max_consecutive_errors,
            poll_interval,
        }
    }
}

/// Failure bookkeeping for one traversal.
#[derive(Debug)]
pub struct PollState {
    /// Failed cycles since the last healthy one
    pub consecutive_errors: u32,
    config: PollConfig,
}

impl PollState {
    pub fn new(config: PollConfig) -> Self {
        Self {
            consecutive_errors: 0,
            config,
        }
    }

    /// Record a healthy cycle; clears the failure streak.
    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
    }

    /// Record a cycle that failed.
    pub fn record_error(&mut self) {
        self.consecutive_errors += 1;
    }

    /// Whether the failure streak used up the budget.
    pub fn should_give_up(&self) -> bool {
        self.consecutive_errors >= self.config.max_consecutive_errors
    }

    /// Delay before the next attempt.
    pub fn next_delay(&self) -> Duration {
        if self.consecutive_errors > 0 {
            calculate_backoff(&self.config.backoff, self.consecutive_errors)
                .max(self.config.poll_interval)
        } else {
            self.config.poll_interval
        }
    }
}

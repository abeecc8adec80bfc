//! Backoff schedule for transient failures.

use std::time::Duration;

use crate::config::WorkerConfig;

/// How often and how patiently a failing fetch is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles after each failure
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Default::default()
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.fetch_max_retries, config.fetch_retry_base)
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Wait before the attempt following failed attempt `attempt` (1-based),
    /// or `None` once the ceiling is reached.
    pub fn backoff(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        let doublings = (attempt - 1).min(16);
        Some(self.base_delay.saturating_mul(1u32 << doublings).min(self.max_delay))
    }
}

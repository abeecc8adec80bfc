//! Queue configuration.

/// Queue sizing.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Bound of the command channel into the actor
    pub capacity: usize,
    /// Terminal jobs kept for polling; the oldest is evicted first
    pub max_retained_jobs: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            max_retained_jobs: 1000,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            capacity: std::env::var("QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.capacity),
            max_retained_jobs: std::env::var("MAX_RETAINED_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retained_jobs),
        }
    }
}

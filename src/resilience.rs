//! Reconnect policy.
//!
//! The replication connection is long-lived: once it drops, the client keeps
//! trying to get it back until it is explicitly stopped. [`RetryConfig`]
//! describes how long to wait between attempts.
//!
//! # Example
//!
//! ```rust
//! use synapse_replication::resilience::RetryConfig;
//! use std::time::Duration;
//!
//! let retry = RetryConfig::daemon();
//! assert_eq!(retry.delay_for_attempt(1), Duration::from_secs(5));
//! assert_eq!(retry.delay_for_attempt(100), Duration::from_secs(5));
//! ```

use std::time::Duration;

/// Configuration for connection retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    /// Set to `usize::MAX` for infinite retries (daemon mode).
    pub max_attempts: usize,

    /// Initial delay before first retry.
    pub initial_delay: Duration,

    /// Maximum delay between retries (ceiling for exponential backoff).
    pub max_delay: Duration,

    /// Backoff multiplier (1.0 = fixed delay).
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::daemon()
    }
}

impl RetryConfig {
    /// Fixed delay between attempts, retrying forever.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            max_attempts: usize::MAX,
            initial_delay: delay,
            max_delay: delay,
            backoff_factor: 1.0,
        }
    }

    /// Reconnect policy of a long-running client: every 5 seconds, forever.
    pub fn daemon() -> Self {
        Self::fixed(Duration::from_secs(5))
    }

    /// Fast retry for tests.
    pub fn testing() -> Self {
        Self::fixed(Duration::from_millis(10))
    }

    /// Whether another attempt is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }

    /// Calculate delay for a given attempt number (1-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        let multiplier = self.backoff_factor.powi((attempt - 1).min(i32::MAX as usize) as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs)
    }
}

//! Retry and polling policies

use std::time::Duration;

/// Backoff policy for reopening a failed conversation stream.
///
/// A send makes one attempt plus up to `max_retries` retries. With the
/// defaults the retries wait 1s, 2s and 4s.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries allowed after the first stream attempt
    pub max_retries: u32,
    /// Wait before retry 1
    pub initial_delay: Duration,
    /// Ceiling on any single wait
    pub max_delay: Duration,
    /// Growth factor from one wait to the next
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Default waits with a different retry budget
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// `initial_delay * multiplier^step`, capped at `max_delay`
    pub fn delay_for_attempt(&self, step: u32) -> Duration {
        let exponent = i32::try_from(step).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Wait before retry `retry`, counting from 1
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        self.delay_for_attempt(retry.saturating_sub(1))
    }
}

/// Fallback polling configuration
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Give up after this long
    pub timeout: Duration,
    /// Sleep between status checks
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_secs(2),
        }
    }
}

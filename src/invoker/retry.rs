//! Retry policy for transient tool failures
//!
//! Cloud APIs throttle and provider registries drop connections; when a
//! failed run's output names one of those conditions the command is re-run
//! with exponential backoff.

use std::time::Duration;

/// When and how often to re-run a failed command
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Output substrings that mark a failure as transient
    pub retryable_errors: Vec<String>,
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        crate::common::config::RetryConfig::default().policy()
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            retryable_errors: Vec::new(),
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Same policy with extra retryable substrings appended
    pub fn with_extra_errors(&self, extra: &[String]) -> Self {
        let mut policy = self.clone();
        for e in extra {
            if !policy.retryable_errors.contains(e) {
                policy.retryable_errors.push(e.clone());
            }
        }
        policy
    }

    /// The first retryable substring found in `output`
    pub fn matching_error(&self, output: &str) -> Option<&str> {
        self.retryable_errors
            .iter()
            .find(|e| !e.is_empty() && output.contains(e.as_str()))
            .map(String::as_str)
    }

    /// Whether a failed `attempt` (1-based) with this output should be re-run
    pub fn should_retry(&self, attempt: u32, output: &str) -> bool {
        attempt < self.max_attempts && self.matching_error(output).is_some()
    }

    /// Delay before the attempt following `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failed attempt may be retried
//! - Produce the delay to wait before the next attempt
//!
//! # Design Decisions
//! - Never retry a non-recoverable classification, regardless of budget
//! - `retryable_errors` narrows the recoverable categories; empty allows all
//! - No delay before the first attempt or after the last one

use std::time::Duration;

use crate::config::RetryConfig;
use crate::resilience::backoff::calculate_delay;
use crate::resilience::classifier::ErrorClassification;

/// Applies one retry configuration.
#[derive(Debug, Clone)]
pub struct RetryManager {
    config: RetryConfig,
}

impl RetryManager {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Total attempts allowed (at least one).
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Delay to wait after failed attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_delay(attempt, &self.config)
    }

    /// The delays between consecutive attempts, one per gap.
    pub fn delays(&self) -> Vec<Duration> {
        (1..self.max_attempts()).map(|a| self.delay_for(a)).collect()
    }

    /// Whether failed attempt `attempt` with this classification may be followed by another.
    pub fn should_retry(&self, attempt: u32, classification: &ErrorClassification) -> bool {
        attempt < self.max_attempts()
            && classification.is_recoverable
            && (self.config.retryable_errors.is_empty()
                || self.config.retryable_errors.contains(&classification.category))
    }
}

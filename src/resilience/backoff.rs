//! Retry delay computation with optional jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::{BackoffStrategy, RetryConfig};

/// Calculate the delay to wait after failed attempt `attempt` (1-based).
///
/// Attempt 0 yields no delay. Jitter scales the raw delay by a uniform factor
/// in `[0.5, 1.0]` for every strategy; the result never exceeds `max_delay_ms`.
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base = config.base_delay_ms as f64;
    let raw_ms = match config.strategy {
        BackoffStrategy::Fixed => base,
        BackoffStrategy::Linear => base * attempt as f64,
        BackoffStrategy::Exponential => {
            let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
            base * config.backoff_multiplier.powi(exponent)
        }
    };

    let jittered_ms = if config.jitter {
        raw_ms * rand::thread_rng().gen_range(0.5..=1.0)
    } else {
        raw_ms
    };

    let capped_ms = if jittered_ms.is_finite() {
        jittered_ms.clamp(0.0, config.max_delay_ms as f64)
    } else {
        config.max_delay_ms as f64
    };

    Duration::from_millis(capped_ms.round() as u64)
}

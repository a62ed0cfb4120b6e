//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (attempts >= 1, delays ordered, thresholds in [0, 1])
//! - Validate every named strategy and the default strategy
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RecoveryConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::{CircuitBreakerConfig, RecoveryConfig, RetryConfig, StrategyConfig};

/// A single semantic problem with a configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate the whole engine configuration.
pub fn validate_config(config: &RecoveryConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.event_capacity == 0 {
        errors.push(ValidationError::new("event_capacity", "must be at least 1"));
    }

    if let Some(default) = &config.default_strategy {
        check_strategy("default_strategy", default, &mut errors);
    }

    for (name, strategy) in &config.strategies {
        if name.trim().is_empty() {
            errors.push(ValidationError::new("strategies", "strategy names must not be empty"));
        }
        check_strategy(&format!("strategies.{}", name), strategy, &mut errors);
    }

    if config.state.max_checkpoints == 0 {
        errors.push(ValidationError::new("state.max_checkpoints", "must be at least 1"));
    }
    if config.state.max_memory_bytes == 0 {
        errors.push(ValidationError::new("state.max_memory_bytes", "must be greater than 0"));
    }

    if config.metrics.retention_secs == 0 {
        errors.push(ValidationError::new("metrics.retention_secs", "must be greater than 0"));
    }

    let health = &config.health;
    let in_unit = |v: f64| (0.0..=1.0).contains(&v);
    if !in_unit(health.healthy_success_rate) || !in_unit(health.unhealthy_success_rate) {
        errors.push(ValidationError::new("health", "success rate thresholds must be within [0, 1]"));
    } else if health.unhealthy_success_rate > health.healthy_success_rate {
        errors.push(ValidationError::new(
            "health.unhealthy_success_rate",
            "must not exceed healthy_success_rate",
        ));
    }
    if !in_unit(health.memory_warning_ratio) {
        errors.push(ValidationError::new("health.memory_warning_ratio", "must be within [0, 1]"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a single strategy.
pub fn validate_strategy(prefix: &str, strategy: &StrategyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_strategy(prefix, strategy, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_strategy(prefix: &str, strategy: &StrategyConfig, errors: &mut Vec<ValidationError>) {
    check_retry(&format!("{}.retry", prefix), &strategy.retry, errors);
    if let Some(breaker) = &strategy.circuit_breaker {
        check_breaker(&format!("{}.circuit_breaker", prefix), breaker, errors);
    }
}

fn check_retry(prefix: &str, retry: &RetryConfig, errors: &mut Vec<ValidationError>) {
    if retry.max_attempts == 0 {
        errors.push(ValidationError::new(format!("{}.max_attempts", prefix), "must be at least 1"));
    }
    if retry.base_delay_ms > retry.max_delay_ms {
        errors.push(ValidationError::new(
            format!("{}.base_delay_ms", prefix),
            "must not exceed max_delay_ms",
        ));
    }
    if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
        errors.push(ValidationError::new(
            format!("{}.backoff_multiplier", prefix),
            "must be a finite value >= 1.0",
        ));
    }
}

fn check_breaker(prefix: &str, breaker: &CircuitBreakerConfig, errors: &mut Vec<ValidationError>) {
    if breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(
            format!("{}.failure_threshold", prefix),
            "must be at least 1",
        ));
    }
    if breaker.recovery_timeout_ms == 0 {
        errors.push(ValidationError::new(
            format!("{}.recovery_timeout_ms", prefix),
            "must be greater than 0",
        ));
    }
    if breaker.monitoring_window_ms == 0 {
        errors.push(ValidationError::new(
            format!("{}.monitoring_window_ms", prefix),
            "must be greater than 0",
        ));
    }
}

/// Render a list of validation errors as one line.
pub fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&RecoveryConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = RecoveryConfig::default();
        let mut strategy = StrategyConfig::default();
        strategy.retry.max_attempts = 0;
        strategy.retry.base_delay_ms = 50_000;
        strategy.circuit_breaker = Some(CircuitBreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        });
        config.strategies.insert("api".to_string(), strategy);
        config.state.max_checkpoints = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.field == "strategies.api.retry.max_attempts"));
        assert!(errors.iter().any(|e| e.field == "strategies.api.retry.base_delay_ms"));
        assert!(errors
            .iter()
            .any(|e| e.field == "strategies.api.circuit_breaker.failure_threshold"));
        assert!(errors.iter().any(|e| e.field == "state.max_checkpoints"));
    }

    #[test]
    fn test_health_thresholds_ordered() {
        let mut config = RecoveryConfig::default();
        config.health.unhealthy_success_rate = 0.95;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "health.unhealthy_success_rate");
    }

    #[test]
    fn test_multiplier_must_grow() {
        let mut strategy = StrategyConfig::default();
        strategy.retry.backoff_multiplier = 0.5;
        let errors = validate_strategy("s", &strategy).unwrap_err();
        assert_eq!(join_errors(&errors), "s.retry.backoff_multiplier: must be a finite value >= 1.0");
    }
}

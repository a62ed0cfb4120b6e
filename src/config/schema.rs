//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the recovery engine.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::classifier::ErrorCategory;

/// Root configuration for the recovery engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// How long `shutdown()` waits for active operations to drain, in milliseconds.
    pub global_timeout_ms: u64,

    /// Capacity of the lifecycle event channel.
    pub event_capacity: usize,

    /// Strategy used when no name is given or the name is unknown.
    pub default_strategy: Option<StrategyConfig>,

    /// Named strategies registered at construction.
    pub strategies: BTreeMap<String, StrategyConfig>,

    /// Checkpoint storage settings.
    pub state: StateConfig,

    /// Metrics retention settings.
    pub metrics: MetricsConfig,

    /// Health derivation thresholds.
    pub health: HealthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            global_timeout_ms: 30_000,
            event_capacity: 256,
            default_strategy: Some(StrategyConfig::default()),
            strategies: BTreeMap::new(),
            state: StateConfig::default(),
            metrics: MetricsConfig::default(),
            health: HealthConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl RecoveryConfig {
    pub fn global_timeout(&self) -> Duration {
        Duration::from_millis(self.global_timeout_ms)
    }
}

/// Serializable part of a recovery strategy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StrategyConfig {
    /// Retry behavior.
    pub retry: RetryConfig,

    /// Optional circuit breaker wrapped around the whole retry loop.
    pub circuit_breaker: Option<CircuitBreakerConfig>,

    /// Create a seed checkpoint before the operation runs.
    pub enable_state_management: bool,

    /// Record outcomes in the metrics collector.
    pub enable_metrics: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            circuit_breaker: None,
            enable_state_management: false,
            enable_metrics: true,
        }
    }
}

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    Exponential,
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// How the delay grows between attempts.
    pub strategy: BackoffStrategy,

    /// Total number of attempts, including the first one.
    pub max_attempts: u32,

    /// Base delay in milliseconds.
    pub base_delay_ms: u64,

    /// Upper bound for any single delay in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor for exponential backoff.
    pub backoff_multiplier: f64,

    /// Scale each delay by a random factor in [0.5, 1.0].
    pub jitter: bool,

    /// Categories eligible for retry. Empty means every recoverable category.
    pub retryable_errors: Vec<ErrorCategory>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
            retryable_errors: vec![
                ErrorCategory::Network,
                ErrorCategory::Timeout,
                ErrorCategory::System,
            ],
        }
    }
}

impl RetryConfig {
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures within the window needed to open the circuit.
    pub failure_threshold: u32,

    /// Time spent open before a trial call is admitted, in milliseconds.
    pub recovery_timeout_ms: u64,

    /// Rolling window over which outcomes are counted, in milliseconds.
    pub monitoring_window_ms: u64,

    /// Minimum calls within the window before the circuit may open.
    pub minimum_throughput: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
            monitoring_window_ms: 60_000,
            minimum_throughput: 10,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    pub fn monitoring_window(&self) -> Duration {
        Duration::from_millis(self.monitoring_window_ms)
    }
}

/// Checkpoint storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StateConfig {
    /// Maximum checkpoints kept per operation (oldest evicted first).
    pub max_checkpoints: usize,

    /// Approximate byte budget across all checkpoints.
    pub max_memory_bytes: usize,

    /// Deflate checkpoint snapshots at rest.
    pub compression: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            max_checkpoints: 10,
            max_memory_bytes: 50 * 1024 * 1024, // 50MB
            compression: false,
        }
    }
}

/// Metrics retention configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Records older than this are discarded, in seconds.
    pub retention_secs: u64,

    /// Minimum time between retention sweeps, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            retention_secs: 3_600,
            sweep_interval_secs: 60,
        }
    }
}

impl MetricsConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Health derivation thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Success rate at or above which the engine reports healthy.
    pub healthy_success_rate: f64,

    /// Success rate below which the engine reports unhealthy.
    pub unhealthy_success_rate: f64,

    /// Fraction of the checkpoint memory budget that raises a warning.
    pub memory_warning_ratio: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            healthy_success_rate: 0.9,
            unhealthy_success_rate: 0.5,
            memory_warning_ratio: 0.9,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

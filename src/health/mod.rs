//! Health derivation.
//!
//! # Data Flow
//! ```text
//! RecoveryManager::get_health_status()
//!     → collect HealthDetails (metrics, breakers, checkpoint memory)
//!     → evaluate() against HealthConfig thresholds
//!     → HealthStatus { is_healthy, status, details, errors }
//! ```
//!
//! # State Derivation
//! ```text
//! success_rate < unhealthy_success_rate            → Unhealthy
//! success_rate < healthy_success_rate or any error → Degraded
//! otherwise                                        → Healthy
//! ```
//!
//! # Design Decisions
//! - No recorded operations counts as a perfect success rate
//! - Component errors (open breakers, memory pressure) degrade but never make the engine unhealthy

use std::fmt;

use serde::Serialize;

use crate::config::HealthConfig;
use crate::resilience::circuit_breaker::{CircuitSnapshot, CircuitState};

/// Overall health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Inputs to health derivation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthDetails {
    pub total_operations: usize,
    /// Success rate used for the decision; `1.0` with no operations.
    pub success_rate: f64,
    pub active_operations: usize,
    pub checkpoints: usize,
    pub memory_usage_bytes: usize,
    pub memory_budget_bytes: usize,
    pub circuit_breakers: Vec<CircuitSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub status: HealthState,
    pub details: HealthDetails,
    pub errors: Vec<String>,
}

/// Derive a `HealthStatus` from collected details.
pub fn evaluate(config: &HealthConfig, details: HealthDetails) -> HealthStatus {
    let mut errors = Vec::new();

    for breaker in &details.circuit_breakers {
        if breaker.state == CircuitState::Open {
            errors.push(format!("Circuit breaker {} is open", breaker.key));
        }
    }

    if details.memory_budget_bytes > 0 {
        let ratio = details.memory_usage_bytes as f64 / details.memory_budget_bytes as f64;
        if ratio > config.memory_warning_ratio {
            errors.push(format!(
                "Checkpoint memory at {:.0}% of budget",
                ratio * 100.0
            ));
        }
    }

    let status = if details.success_rate < config.unhealthy_success_rate {
        HealthState::Unhealthy
    } else if details.success_rate < config.healthy_success_rate || !errors.is_empty() {
        HealthState::Degraded
    } else {
        HealthState::Healthy
    };

    HealthStatus {
        is_healthy: status == HealthState::Healthy,
        status,
        details,
        errors,
    }
}

//! Metrics exposition.
//!
//! # Responsibilities
//! - Define recovery metrics (operations, attempts, errors, fallbacks, breaker state)
//! - Expose a Prometheus-compatible scrape endpoint when enabled
//!
//! # Metrics
//! - `recovery_operations_total` (counter): executions by strategy, outcome
//! - `recovery_operation_duration_seconds` (histogram): end-to-end execution time
//! - `recovery_attempts_total` (counter): operation invocations by strategy
//! - `recovery_errors_total` (counter): terminal errors by category, severity
//! - `recovery_fallbacks_total` (counter): fallback invocations by outcome
//! - `recovery_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `recovery_checkpoints` (gauge): checkpoints currently stored
//!
//! # Design Decisions
//! - Facade calls are no-ops until a recorder is installed
//! - Only the binary installs the exporter; the library never does

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;
use crate::resilience::classifier::ErrorClassification;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished `execute()` call.
pub fn record_operation(strategy: &str, success: bool, attempts: usize, duration: Duration) {
    let outcome = if success { "success" } else { "failure" };
    counter!("recovery_operations_total", "strategy" => strategy.to_string(), "outcome" => outcome)
        .increment(1);
    counter!("recovery_attempts_total", "strategy" => strategy.to_string()).increment(attempts as u64);
    histogram!("recovery_operation_duration_seconds", "strategy" => strategy.to_string())
        .record(duration.as_secs_f64());
}

/// Record a classified terminal error.
pub fn record_error(classification: &ErrorClassification) {
    counter!(
        "recovery_errors_total",
        "category" => classification.category.as_str(),
        "severity" => classification.severity.as_str()
    )
    .increment(1);
}

/// Record a fallback invocation.
pub fn record_fallback(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!("recovery_fallbacks_total", "outcome" => outcome).increment(1);
}

/// Record a breaker state transition.
pub fn record_circuit_state(key: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("recovery_circuit_state", "key" => key.to_string()).set(value);
}

/// Record the number of stored checkpoints.
pub fn record_checkpoint_count(count: usize) {
    gauge!("recovery_checkpoints").set(count as f64);
}

//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::broadcast;

use recovery_engine::config::{BackoffStrategy, CircuitBreakerConfig, RecoveryConfig, RetryConfig, StrategyConfig};
use recovery_engine::observability::RecoveryEvent;

/// An operation that fails a fixed number of times before succeeding.
#[derive(Clone)]
pub struct ScriptedOperation {
    calls: Arc<AtomicU32>,
    failures: u32,
    error: &'static str,
    value: &'static str,
    latency: Duration,
}

impl ScriptedOperation {
    pub fn failing_then_ok(failures: u32, error: &'static str) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            failures,
            error,
            value: "ok",
            latency: Duration::ZERO,
        }
    }

    pub fn always_failing(error: &'static str) -> Self {
        Self::failing_then_ok(u32::MAX, error)
    }

    pub fn always_ok() -> Self {
        Self::failing_then_ok(0, "")
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Invoke once. Call count is incremented before the latency elapses.
    pub fn call(&self) -> BoxFuture<'static, Result<String, String>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let (failures, error, value, latency) = (self.failures, self.error, self.value, self.latency);
        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            if n < failures {
                Err(error.to_string())
            } else {
                Ok(value.to_string())
            }
        }
        .boxed()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Fixed 1ms backoff without jitter.
pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        strategy: BackoffStrategy::Fixed,
        max_attempts,
        base_delay_ms: 1,
        max_delay_ms: 10,
        jitter: false,
        ..RetryConfig::default()
    }
}

/// Breaker opening after `threshold` failures with a short recovery timeout.
pub fn fast_breaker(threshold: u32, recovery_timeout_ms: u64) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: threshold,
        minimum_throughput: threshold,
        recovery_timeout_ms,
        monitoring_window_ms: 60_000,
    }
}

/// Config whose default strategy retries quickly.
pub fn test_config() -> RecoveryConfig {
    RecoveryConfig {
        default_strategy: Some(StrategyConfig {
            retry: fast_retry(3),
            ..StrategyConfig::default()
        }),
        ..RecoveryConfig::default()
    }
}

/// Drain every event currently buffered in `rx`.
pub fn drain_events(rx: &mut broadcast::Receiver<RecoveryEvent>) -> Vec<RecoveryEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

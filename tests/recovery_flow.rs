//! End-to-end recovery behaviour through the public `RecoveryManager` API.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use recovery_engine::config::{BackoffStrategy, RetryConfig};
use recovery_engine::resilience::backoff::calculate_delay;
use recovery_engine::resilience::{CircuitState, ErrorCategory, RetryManager};
use recovery_engine::{Fallback, RecoveryAction, RecoveryError, RecoveryManager, RecoveryStrategy};

mod common;

use common::{drain_events, fast_breaker, fast_retry, test_config, ScriptedOperation};

#[tokio::test]
async fn test_end_to_end_retry_then_success() {
    let manager = RecoveryManager::new(test_config()).unwrap();
    manager
        .add_strategy(
            "api",
            RecoveryStrategy::default().with_retry(RetryConfig {
                strategy: BackoffStrategy::Exponential,
                max_attempts: 3,
                base_delay_ms: 10,
                jitter: false,
                ..RetryConfig::default()
            }),
        )
        .unwrap();

    let op = ScriptedOperation::failing_then_ok(2, "ECONNREFUSED");
    let result = manager.execute(|| op.call(), "validate-1", Some("api")).await;

    assert!(result.success);
    assert_eq!(result.result.as_deref(), Some("ok"));
    assert_eq!(result.attempts.len(), 3);
    let outcomes: Vec<bool> = result.attempts.iter().map(|a| a.success).collect();
    assert_eq!(outcomes, vec![false, false, true]);
    assert_eq!(result.recovery_action, RecoveryAction::Retry);
    assert_eq!(
        result.attempts[0].classification.unwrap().category,
        ErrorCategory::Network
    );
    // 10ms + 20ms of backoff
    assert!(result.total_duration >= Duration::from_millis(30));
    assert_eq!(result.context.strategy, "api");
}

#[tokio::test]
async fn test_retry_bound() {
    let manager = RecoveryManager::new(test_config()).unwrap();
    manager
        .add_strategy("four", RecoveryStrategy::default().with_retry(fast_retry(4)))
        .unwrap();

    let op = ScriptedOperation::always_failing("ECONNREFUSED");
    let result = manager.execute(|| op.call(), "op", Some("four")).await;

    assert!(!result.success);
    assert_eq!(op.calls(), 4);
    assert_eq!(result.attempts.len(), 4);
    assert_eq!(result.failed_attempts(), 4);
    assert_eq!(result.error.unwrap().to_string(), "ECONNREFUSED");
}

#[tokio::test]
async fn test_early_success_stops_retrying() {
    let manager = RecoveryManager::new(test_config()).unwrap();
    manager
        .add_strategy("five", RecoveryStrategy::default().with_retry(fast_retry(5)))
        .unwrap();

    let op = ScriptedOperation::failing_then_ok(2, "request timed out");
    let result = manager.execute(|| op.call(), "op", Some("five")).await;

    assert!(result.success);
    assert_eq!(op.calls(), 3);
    assert_eq!(result.attempts.len(), 3);
    assert_eq!(result.attempts.last().unwrap().attempt, 3);
}

#[test]
fn test_exponential_delays_are_monotonic_and_clamped() {
    let mut config = RetryConfig {
        strategy: BackoffStrategy::Exponential,
        max_attempts: 4,
        base_delay_ms: 1000,
        max_delay_ms: 30_000,
        backoff_multiplier: 2.0,
        jitter: false,
        ..RetryConfig::default()
    };
    let delays: Vec<u128> = RetryManager::new(config.clone())
        .delays()
        .iter()
        .map(Duration::as_millis)
        .collect();
    assert_eq!(delays, vec![1000, 2000, 4000]);

    config.max_delay_ms = 3000;
    assert_eq!(calculate_delay(3, &config), Duration::from_millis(3000));
}

#[tokio::test]
async fn test_circuit_opens_and_rejects() {
    let manager = RecoveryManager::new(test_config()).unwrap();
    manager
        .add_strategy(
            "guarded",
            RecoveryStrategy::default()
                .with_retry(fast_retry(1))
                .with_circuit_breaker(fast_breaker(3, 60_000)),
        )
        .unwrap();

    let op = ScriptedOperation::always_failing("ECONNREFUSED");
    for _ in 0..3 {
        let result = manager.execute(|| op.call(), "op", Some("guarded")).await;
        assert!(!result.success);
    }
    assert_eq!(manager.circuit_state("strategy:guarded"), Some(CircuitState::Open));

    let result = manager.execute(|| op.call(), "op", Some("guarded")).await;
    assert_eq!(op.calls(), 3, "open circuit must not invoke the operation");
    assert!(result.attempts.is_empty());
    assert_eq!(result.recovery_action, RecoveryAction::CircuitBreaker);
    assert!(result.error.unwrap().is_circuit_open());
}

#[tokio::test]
async fn test_half_open_recovery_resets_counters() {
    let manager = RecoveryManager::new(test_config()).unwrap();
    manager
        .add_strategy(
            "guarded",
            RecoveryStrategy::default()
                .with_retry(fast_retry(1))
                .with_circuit_breaker(fast_breaker(3, 50)),
        )
        .unwrap();

    let failing = ScriptedOperation::always_failing("ECONNREFUSED");
    for _ in 0..3 {
        manager.execute(|| failing.call(), "op", Some("guarded")).await;
    }
    assert_eq!(manager.circuit_state("strategy:guarded"), Some(CircuitState::Open));

    tokio::time::sleep(Duration::from_millis(70)).await;
    let healthy = ScriptedOperation::always_ok();
    let result = manager.execute(|| healthy.call(), "op", Some("guarded")).await;
    assert!(result.success);
    assert_eq!(manager.circuit_state("strategy:guarded"), Some(CircuitState::Closed));

    for _ in 0..2 {
        manager.execute(|| failing.call(), "op", Some("guarded")).await;
    }
    assert_eq!(manager.circuit_state("strategy:guarded"), Some(CircuitState::Closed));
    manager.execute(|| failing.call(), "op", Some("guarded")).await;
    assert_eq!(manager.circuit_state("strategy:guarded"), Some(CircuitState::Open));
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ValidationState {
    x: u32,
    tags: Vec<String>,
}

#[tokio::test]
async fn test_checkpoint_round_trip_is_isolated() {
    let manager = RecoveryManager::new(test_config()).unwrap();
    let mut state = ValidationState {
        x: 1,
        tags: vec!["draft".to_string()],
    };
    let id = manager.create_checkpoint("op", &state, "d").unwrap();

    state.x = 99;
    state.tags.push("mutated".to_string());

    let restored: ValidationState =
        serde_json::from_value(manager.rollback_to_checkpoint("op", &id).unwrap()).unwrap();
    assert_eq!(
        restored,
        ValidationState {
            x: 1,
            tags: vec!["draft".to_string()],
        }
    );
}

#[tokio::test]
async fn test_fallback_only_for_recoverable_errors() {
    let manager = RecoveryManager::new(test_config()).unwrap();
    let fallback_calls = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
    let counter = fallback_calls.clone();
    manager
        .add_strategy(
            "cached",
            RecoveryStrategy::default()
                .with_retry(fast_retry(2))
                .with_fallback(Fallback::new(move || {
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    async { Ok::<_, RecoveryError>(String::from("cached")) }
                })),
        )
        .unwrap();

    let auth = ScriptedOperation::always_failing("401 Unauthorized");
    let result = manager.execute(|| auth.call(), "op", Some("cached")).await;
    assert!(!result.success);
    assert_eq!(auth.calls(), 1);
    assert_eq!(fallback_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(result.error.unwrap().to_string(), "401 Unauthorized");

    let network = ScriptedOperation::always_failing("ECONNREFUSED");
    let result = manager.execute(|| network.call(), "op", Some("cached")).await;
    assert!(result.success);
    assert_eq!(result.result.as_deref(), Some("cached"));
    assert_eq!(result.recovery_action, RecoveryAction::Fallback);
    assert_eq!(fallback_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(result.attempts.len(), 3);
    assert_eq!(result.attempts[2].action, RecoveryAction::Fallback);
}

#[tokio::test]
async fn test_metrics_consistency() {
    let manager = RecoveryManager::new(test_config()).unwrap();
    let ok = ScriptedOperation::always_ok();
    let bad = ScriptedOperation::always_failing("403 Forbidden");

    for i in 0..4 {
        manager.execute(|| ok.call(), &format!("ok-{i}"), None).await;
    }
    for i in 0..2 {
        manager.execute(|| bad.call(), &format!("bad-{i}"), None).await;
    }

    let stats = manager.get_stats();
    assert_eq!(stats.total_operations, 6);
    assert_eq!(stats.successful_operations, 4);
    assert!((stats.success_rate - 4.0 / 6.0).abs() < 1e-9);
    assert_eq!(stats.errors_by_category[&ErrorCategory::Auth], 2);
    assert_eq!(manager.metrics().get_operation_stats("bad-0").unwrap().failures, 1);
}

#[tokio::test]
async fn test_event_ordering() {
    let manager = RecoveryManager::new(test_config()).unwrap();
    let mut rx = manager.subscribe();

    let op = ScriptedOperation::failing_then_ok(2, "ETIMEDOUT");
    let result = manager.execute(|| op.call(), "ordered", None).await;
    assert!(result.success);

    let names: Vec<&str> = drain_events(&mut rx)
        .iter()
        .filter(|e| e.operation_id() == Some("ordered"))
        .map(|e| e.name())
        .collect();
    assert_eq!(names.first(), Some(&"recovery.started"));
    assert_eq!(names.last(), Some(&"recovery.success"));
    assert_eq!(names.iter().filter(|n| **n == "attempt.failed").count(), 2);
    assert_eq!(
        names
            .iter()
            .filter(|n| **n == "recovery.success" || **n == "recovery.failure")
            .count(),
        1
    );
}

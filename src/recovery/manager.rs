//! Recovery orchestration.
//!
//! # Responsibilities
//! - Resolve the strategy for each call
//! - Drive retries inside an optional circuit breaker
//! - Invoke the fallback when the terminal error is recoverable
//! - Record attempts and outcomes, emit lifecycle events
//! - Own checkpoints, breakers and metrics for its whole lifetime
//!
//! # Data Flow
//! ```text
//! execute(operation, id, strategy)
//!     → resolve strategy (named or default)
//!     → register in active table, emit recovery.started
//!     → optional initial checkpoint
//!     → [circuit breaker] → attempt loop (classify, delay, retry)
//!     → on failure: record error, fallback if recoverable
//!     → record outcome, emit recovery.success | recovery.failure
//!     → guard drop removes the active entry
//! ```
//!
//! # Design Decisions
//! - Named strategies share a breaker keyed `strategy:<name>`; default-strategy calls get `operation:<id>`
//! - Idle `operation:<id>` breakers are pruned once per monitoring window
//! - Breaker and metrics locks are never held across an await
//! - After `shutdown()` starts, new calls fail with `ShuttingDown` without running

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::validation::{join_errors, validate_config, validate_strategy};
use crate::config::{CircuitBreakerConfig, RecoveryConfig};
use crate::error::{BoxError, RecoveryError, Result};
use crate::health::{self, HealthDetails, HealthStatus};
use crate::lifecycle::{drain, DrainOutcome, Shutdown};
use crate::observability::collector::{MetricsCollector, RecoveryStats};
use crate::observability::events::{EventBus, RecoveryEvent};
use crate::observability::metrics;
use crate::recovery::strategy::RecoveryStrategy;
use crate::recovery::types::{RecoveryAction, RecoveryAttempt, RecoveryContext, RecoveryResult};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};
use crate::resilience::classifier::classify;
use crate::resilience::retries::RetryManager;
use crate::state::StateManager;

/// Name reported for calls served by the default strategy.
pub const DEFAULT_STRATEGY: &str = "default";

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

const OPERATION_BREAKER_PREFIX: &str = "operation:";

/// Entry in the active-operations table.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveOperation {
    pub operation_id: String,
    pub strategy: String,
    pub started_at: SystemTime,
    #[serde(skip)]
    token: u64,
}

/// Removes its active-operations entry on drop, unless a newer call with the
/// same id replaced it.
struct ActiveGuard<'a> {
    table: &'a DashMap<String, ActiveOperation>,
    operation_id: String,
    token: u64,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.table
            .remove_if(&self.operation_id, |_, op| op.token == self.token);
    }
}

struct Resolved {
    name: String,
    strategy: RecoveryStrategy,
    breaker_key: String,
}

/// Orchestrates retries, circuit breaking, fallbacks and checkpoints.
#[derive(Debug)]
pub struct RecoveryManager {
    config: RecoveryConfig,
    strategies: DashMap<String, RecoveryStrategy>,
    default_strategy: Option<RecoveryStrategy>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    state: StateManager,
    metrics: Arc<MetricsCollector>,
    events: EventBus,
    active: DashMap<String, ActiveOperation>,
    next_token: AtomicU64,
    last_breaker_prune: Mutex<Instant>,
    shutdown: Shutdown,
}

impl RecoveryManager {
    /// Build a manager from validated configuration.
    ///
    /// Starts the metrics retention sweep when called inside a tokio runtime;
    /// otherwise retention is applied lazily on record.
    pub fn new(config: RecoveryConfig) -> Result<Self> {
        validate_config(&config).map_err(|errors| RecoveryError::InvalidConfig(join_errors(&errors)))?;

        let events = EventBus::new(config.event_capacity);
        let metrics = Arc::new(MetricsCollector::new(config.metrics.clone(), events.clone()));
        if tokio::runtime::Handle::try_current().is_ok() {
            metrics.start_sweeper();
        }

        let strategies = DashMap::new();
        for (name, strategy) in &config.strategies {
            strategies.insert(name.clone(), RecoveryStrategy::from(strategy.clone()));
        }

        tracing::info!(
            strategies = strategies.len(),
            default_strategy = config.default_strategy.is_some(),
            max_checkpoints = config.state.max_checkpoints,
            compression = config.state.compression,
            "Recovery manager initialized"
        );

        Ok(Self {
            default_strategy: config.default_strategy.clone().map(RecoveryStrategy::from),
            state: StateManager::new(config.state.clone()),
            strategies,
            breakers: DashMap::new(),
            metrics,
            events,
            active: DashMap::new(),
            next_token: AtomicU64::new(0),
            last_breaker_prune: Mutex::new(Instant::now()),
            shutdown: Shutdown::new(),
            config,
        })
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Run `operation` under the resolved strategy.
    ///
    /// Never panics or returns early with `Err`: every failure, including an
    /// unknown strategy or a shutdown in progress, is reported in the result.
    pub async fn execute<T, F, Fut, E>(
        &self,
        mut operation: F,
        operation_id: &str,
        strategy: Option<&str>,
    ) -> RecoveryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<BoxError>,
        T: 'static,
    {
        let started = Instant::now();
        let mut context = RecoveryContext::new(operation_id, strategy.unwrap_or(DEFAULT_STRATEGY));

        if self.shutdown.is_triggered() {
            tracing::warn!(operation_id, "Rejecting operation, recovery manager is shutting down");
            return rejected(context, RecoveryError::ShuttingDown, started);
        }

        let resolved = match self.resolve(strategy, operation_id) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(operation_id, error = %e, "Cannot resolve recovery strategy");
                return rejected(context, e, started);
            }
        };
        context.strategy = resolved.name.clone();
        let strategy_config = &resolved.strategy.config;

        let _guard = self.register(&context);
        self.events.emit(RecoveryEvent::Started {
            operation_id: operation_id.to_string(),
            strategy: context.strategy.clone(),
        });
        tracing::debug!(
            operation_id,
            strategy = %context.strategy,
            max_attempts = strategy_config.retry.max_attempts,
            circuit_breaker = strategy_config.circuit_breaker.is_some(),
            "Recovery started"
        );

        if strategy_config.enable_state_management {
            match self.state.create_checkpoint(operation_id, &serde_json::json!({}), "initial") {
                Ok(checkpoint) => {
                    metrics::record_checkpoint_count(self.state.len());
                    context.checkpoints.push(checkpoint);
                }
                Err(e) => {
                    tracing::warn!(operation_id, error = %e, "Failed to create initial checkpoint");
                }
            }
        }

        let retry = RetryManager::new(strategy_config.retry.clone());
        let breaker = strategy_config
            .circuit_breaker
            .as_ref()
            .map(|config| self.breaker(&resolved.breaker_key, config));
        let mut attempts = Vec::new();

        let attempt_loop = self.run_attempts(&mut operation, &retry, &mut context, &mut attempts);
        let outcome = match &breaker {
            Some(breaker) => breaker.execute(move || attempt_loop).await,
            None => attempt_loop.await,
        };

        let enable_metrics = strategy_config.enable_metrics;
        let (result, error, recovery_action) = match outcome {
            Ok(value) => (Some(value), None, action_for(&attempts, None)),
            Err(error) => self.recover(error, &resolved, &mut attempts, operation_id).await,
        };

        let total_duration = started.elapsed();
        let success = result.is_some();
        let rendered_error = error.as_ref().map(ToString::to_string);

        if enable_metrics {
            if !matches!(recovery_action, RecoveryAction::None | RecoveryAction::Fallback) {
                self.metrics.record_recovery(recovery_action, success, total_duration);
            }
            self.metrics
                .record_operation(operation_id, success, total_duration, rendered_error.as_deref());
            metrics::record_operation(&context.strategy, success, attempts.len(), total_duration);
        }

        match rendered_error {
            None => {
                tracing::info!(
                    operation_id,
                    attempts = attempts.len(),
                    action = %recovery_action,
                    duration_ms = total_duration.as_millis() as u64,
                    "Recovery succeeded"
                );
                self.events.emit(RecoveryEvent::Succeeded {
                    operation_id: operation_id.to_string(),
                    attempts: attempts.len(),
                    action: recovery_action,
                    duration: total_duration,
                });
            }
            Some(message) => {
                tracing::error!(
                    operation_id,
                    attempts = attempts.len(),
                    action = %recovery_action,
                    duration_ms = total_duration.as_millis() as u64,
                    error = %message,
                    "Recovery failed"
                );
                self.events.emit(RecoveryEvent::Failed {
                    operation_id: operation_id.to_string(),
                    attempts: attempts.len(),
                    action: recovery_action,
                    error: message,
                    duration: total_duration,
                });
            }
        }

        RecoveryResult {
            success,
            result,
            error,
            attempts,
            total_duration,
            recovery_action,
            context,
        }
    }

    async fn run_attempts<T, F, Fut, E>(
        &self,
        operation: &mut F,
        retry: &RetryManager,
        context: &mut RecoveryContext,
        attempts: &mut Vec<RecoveryAttempt>,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<BoxError>,
    {
        let max_attempts = retry.max_attempts();
        let mut attempt = 1;

        loop {
            context.attempt = attempt;
            let timestamp = SystemTime::now();
            let started = Instant::now();
            let action = if attempt == 1 {
                RecoveryAction::None
            } else {
                RecoveryAction::Retry
            };

            match operation().await {
                Ok(value) => {
                    attempts.push(RecoveryAttempt {
                        attempt,
                        timestamp,
                        error: None,
                        classification: None,
                        action,
                        success: true,
                        duration: started.elapsed(),
                        metadata: BTreeMap::new(),
                    });
                    return Ok(value);
                }
                Err(e) => {
                    let error = RecoveryError::operation(e);
                    let classification = classify(&error);
                    let will_retry = retry.should_retry(attempt, &classification);
                    let delay = if will_retry {
                        retry.delay_for(attempt)
                    } else {
                        Duration::ZERO
                    };
                    let message = error.to_string();

                    attempts.push(RecoveryAttempt {
                        attempt,
                        timestamp,
                        error: Some(message.clone()),
                        classification: Some(classification),
                        action,
                        success: false,
                        duration: started.elapsed(),
                        metadata: BTreeMap::new(),
                    });

                    tracing::warn!(
                        operation_id = %context.operation_id,
                        attempt,
                        max_attempts,
                        category = %classification.category,
                        recoverable = classification.is_recoverable,
                        will_retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Attempt failed"
                    );
                    self.events.emit(RecoveryEvent::AttemptFailed {
                        operation_id: context.operation_id.clone(),
                        attempt,
                        category: classification.category,
                        error: message,
                        will_retry,
                        delay,
                    });

                    if !will_retry {
                        return Err(error);
                    }
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Record the terminal error and apply the fallback if it is eligible.
    async fn recover<T: 'static>(
        &self,
        error: RecoveryError,
        resolved: &Resolved,
        attempts: &mut Vec<RecoveryAttempt>,
        operation_id: &str,
    ) -> (Option<T>, Option<RecoveryError>, RecoveryAction) {
        let classification = classify(&error);
        if resolved.strategy.config.enable_metrics {
            self.metrics
                .record_error(&error.to_string(), classification, Some(operation_id));
        }

        let fallback = match &resolved.strategy.fallback {
            Some(fallback) if classification.is_recoverable => fallback,
            Some(_) => {
                tracing::debug!(
                    operation_id,
                    category = %classification.category,
                    "Skipping fallback for non-recoverable error"
                );
                let action = action_for(attempts, Some(&error));
                return (None, Some(error), action);
            }
            None => {
                let action = action_for(attempts, Some(&error));
                return (None, Some(error), action);
            }
        };

        let timestamp = SystemTime::now();
        let started = Instant::now();
        let outcome = fallback.invoke::<T>().await;
        let duration = started.elapsed();
        let success = outcome.is_ok();

        let mut metadata = BTreeMap::new();
        metadata.insert(
            "original_error".to_string(),
            serde_json::Value::String(error.to_string()),
        );
        attempts.push(RecoveryAttempt {
            attempt: attempts.len() as u32 + 1,
            timestamp,
            error: outcome.as_ref().err().map(ToString::to_string),
            classification: None,
            action: RecoveryAction::Fallback,
            success,
            duration,
            metadata,
        });

        tracing::info!(operation_id, success, duration_ms = duration.as_millis() as u64, "Fallback executed");
        self.events.emit(RecoveryEvent::FallbackExecuted {
            operation_id: operation_id.to_string(),
            success,
            duration,
        });
        metrics::record_fallback(success);
        if resolved.strategy.config.enable_metrics {
            self.metrics
                .record_recovery(RecoveryAction::Fallback, success, duration);
        }

        match outcome {
            Ok(value) => (Some(value), None, RecoveryAction::Fallback),
            Err(fallback_error) => (None, Some(fallback_error), RecoveryAction::Fallback),
        }
    }

    fn resolve(&self, name: Option<&str>, operation_id: &str) -> Result<Resolved> {
        if let Some(name) = name {
            if let Some(strategy) = self.strategies.get(name) {
                return Ok(Resolved {
                    name: name.to_string(),
                    strategy: strategy.value().clone(),
                    breaker_key: strategy_breaker_key(name),
                });
            }
        }

        match (&self.default_strategy, name) {
            (Some(strategy), requested) => {
                if let Some(requested) = requested {
                    tracing::warn!(
                        operation_id,
                        strategy = requested,
                        "Unknown recovery strategy, using default"
                    );
                }
                Ok(Resolved {
                    name: DEFAULT_STRATEGY.to_string(),
                    strategy: strategy.clone(),
                    breaker_key: format!("{OPERATION_BREAKER_PREFIX}{operation_id}"),
                })
            }
            (None, requested) => Err(RecoveryError::StrategyNotFound(
                requested.unwrap_or(DEFAULT_STRATEGY).to_string(),
            )),
        }
    }

    fn breaker(&self, key: &str, config: &CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if key.starts_with(OPERATION_BREAKER_PREFIX) {
            self.maybe_prune_breakers(config.monitoring_window());
        }
        self.breakers
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(key, config.clone(), self.events.clone())))
            .value()
            .clone()
    }

    fn maybe_prune_breakers(&self, interval: Duration) {
        let due = {
            let mut last = self
                .last_breaker_prune
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if last.elapsed() >= interval {
                *last = Instant::now();
                true
            } else {
                false
            }
        };
        if due {
            self.prune_idle_breakers();
        }
    }

    /// Drop per-operation breakers that are closed and have no outcomes in
    /// their monitoring window. Named strategy breakers are kept.
    pub fn prune_idle_breakers(&self) -> usize {
        let before = self.breakers.len();
        self.breakers
            .retain(|key, breaker| !(key.starts_with(OPERATION_BREAKER_PREFIX) && breaker.is_idle()));
        let pruned = before.saturating_sub(self.breakers.len());
        if pruned > 0 {
            tracing::debug!(pruned, remaining = self.breakers.len(), "Pruned idle circuit breakers");
        }
        pruned
    }

    fn register(&self, context: &RecoveryContext) -> ActiveGuard<'_> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.active.insert(
            context.operation_id.clone(),
            ActiveOperation {
                operation_id: context.operation_id.clone(),
                strategy: context.strategy.clone(),
                started_at: context.start_time,
                token,
            },
        );
        ActiveGuard {
            table: &self.active,
            operation_id: context.operation_id.clone(),
            token,
        }
    }

    /// Register or replace a named strategy. Replacing drops its circuit breaker.
    pub fn add_strategy(&self, name: &str, strategy: RecoveryStrategy) -> Result<()> {
        if name.trim().is_empty() {
            return Err(RecoveryError::InvalidConfig(
                "strategy name must not be empty".to_string(),
            ));
        }
        validate_strategy(&format!("strategies.{name}"), &strategy.config)
            .map_err(|errors| RecoveryError::InvalidConfig(join_errors(&errors)))?;

        self.breakers.remove(&strategy_breaker_key(name));
        let replaced = self.strategies.insert(name.to_string(), strategy).is_some();
        tracing::info!(strategy = name, replaced, "Recovery strategy registered");
        Ok(())
    }

    /// Remove a named strategy and its circuit breaker.
    pub fn remove_strategy(&self, name: &str) -> bool {
        self.breakers.remove(&strategy_breaker_key(name));
        let removed = self.strategies.remove(name).is_some();
        if removed {
            tracing::info!(strategy = name, "Recovery strategy removed");
        }
        removed
    }

    pub fn strategy_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Snapshot `state` for `operation_id`; returns the checkpoint id.
    pub fn create_checkpoint<S>(&self, operation_id: &str, state: &S, description: &str) -> Result<String>
    where
        S: Serialize + ?Sized,
    {
        let checkpoint = self.state.create_checkpoint(operation_id, state, description)?;
        metrics::record_checkpoint_count(self.state.len());
        tracing::debug!(
            operation_id,
            checkpoint_id = %checkpoint.id,
            size_bytes = checkpoint.size_bytes,
            "Checkpoint created"
        );
        Ok(checkpoint.id)
    }

    /// Return the snapshot stored in `checkpoint_id`, which must belong to `operation_id`.
    ///
    /// The caller applies the returned state; nothing live is mutated here.
    pub fn rollback_to_checkpoint(&self, operation_id: &str, checkpoint_id: &str) -> Result<serde_json::Value> {
        let checkpoint = self
            .state
            .get_checkpoint(checkpoint_id)
            .filter(|c| c.operation_id == operation_id)
            .ok_or_else(|| RecoveryError::CheckpointNotFound(checkpoint_id.to_string()))?;
        let value = self.state.rollback_value(&checkpoint.id)?;

        tracing::info!(operation_id, checkpoint_id, "Rolled back to checkpoint");
        self.events.emit(RecoveryEvent::RollbackExecuted {
            operation_id: operation_id.to_string(),
            checkpoint_id: checkpoint_id.to_string(),
        });
        Ok(value)
    }

    pub fn get_stats(&self) -> RecoveryStats {
        self.metrics.get_stats()
    }

    pub fn get_health_status(&self) -> HealthStatus {
        let stats = self.metrics.get_stats();
        let state = self.state.get_stats();
        let success_rate = if stats.total_operations == 0 {
            1.0
        } else {
            stats.success_rate
        };

        health::evaluate(
            &self.config.health,
            HealthDetails {
                total_operations: stats.total_operations,
                success_rate,
                active_operations: self.active.len(),
                checkpoints: state.total_checkpoints,
                memory_usage_bytes: state.memory_usage_bytes,
                memory_budget_bytes: state.memory_budget_bytes,
                circuit_breakers: self.circuit_snapshots(),
            },
        )
    }

    pub fn active_operations(&self) -> Vec<ActiveOperation> {
        let mut active: Vec<ActiveOperation> = self.active.iter().map(|e| e.value().clone()).collect();
        active.sort_by_key(|op| op.token);
        active
    }

    /// State of the breaker registered under `key` (`strategy:<name>` or `operation:<id>`).
    pub fn circuit_state(&self, key: &str) -> Option<CircuitState> {
        self.breakers.get(key).map(|b| b.state())
    }

    pub fn circuit_snapshots(&self) -> Vec<CircuitSnapshot> {
        let mut snapshots: Vec<CircuitSnapshot> = self.breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.key.cmp(&b.key));
        snapshots
    }

    /// Observe lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<RecoveryEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Clear active operations, checkpoints, metrics and every circuit breaker.
    pub fn reset(&self) {
        self.active.clear();
        let checkpoints = self.state.clear_checkpoints(None);
        self.metrics.clear();
        for breaker in self.breakers.iter() {
            breaker.reset();
        }
        self.breakers.clear();
        metrics::record_checkpoint_count(0);
        tracing::info!(checkpoints, "Recovery manager reset");
    }

    /// Stop accepting work, wait up to `global_timeout` for active operations,
    /// then release everything and detach all observers.
    pub async fn shutdown(&self) {
        if !self.shutdown.trigger() {
            return;
        }
        tracing::info!(active = self.active.len(), "Recovery manager shutting down");

        let outcome = drain(|| self.active.len(), self.config.global_timeout(), DRAIN_POLL_INTERVAL).await;
        if let DrainOutcome::TimedOut { remaining } = outcome {
            tracing::warn!(remaining, "Shutdown deadline reached, discarding active operations");
        }

        self.active.clear();
        self.breakers.clear();
        self.state.clear_checkpoints(None);
        self.metrics.destroy();
        self.events.close();
        tracing::info!("Recovery manager shutdown complete");
    }
}

fn strategy_breaker_key(name: &str) -> String {
    format!("strategy:{name}")
}

/// Action describing how a result was reached without a fallback.
fn action_for(attempts: &[RecoveryAttempt], error: Option<&RecoveryError>) -> RecoveryAction {
    match error {
        Some(e) if attempts.is_empty() && e.is_circuit_open() => RecoveryAction::CircuitBreaker,
        _ if attempts.len() > 1 => RecoveryAction::Retry,
        _ => RecoveryAction::None,
    }
}

fn rejected<T>(context: RecoveryContext, error: RecoveryError, started: Instant) -> RecoveryResult<T> {
    RecoveryResult {
        success: false,
        result: None,
        error: Some(error),
        attempts: Vec::new(),
        total_duration: started.elapsed(),
        recovery_action: RecoveryAction::None,
        context,
    }
}

impl ActiveOperation {
    /// Time since the call was registered.
    pub fn age(&self) -> Duration {
        self.started_at.elapsed().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackoffStrategy, RetryConfig, StrategyConfig};
    use crate::recovery::strategy::Fallback;
    use std::sync::atomic::AtomicU32;

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            strategy: BackoffStrategy::Fixed,
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter: false,
            ..RetryConfig::default()
        }
    }

    fn manager() -> RecoveryManager {
        let config = RecoveryConfig {
            default_strategy: Some(StrategyConfig {
                retry: fast_retry(3),
                ..StrategyConfig::default()
            }),
            ..RecoveryConfig::default()
        };
        RecoveryManager::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let m = manager();
        let result = m.execute(|| async { Ok::<_, BoxError>(7) }, "op", None).await;
        assert!(result.success);
        assert_eq!(result.result, Some(7));
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(result.recovery_action, RecoveryAction::None);
        assert_eq!(result.context.strategy, DEFAULT_STRATEGY);
    }

    #[tokio::test]
    async fn test_non_recoverable_short_circuits() {
        let m = manager();
        let calls = AtomicU32::new(0);
        let result = m
            .execute(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>("401 Unauthorized") }
                },
                "op",
                None,
            )
            .await;
        assert!(!result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(result.error.unwrap().to_string(), "401 Unauthorized");
    }

    #[tokio::test]
    async fn test_unknown_strategy_without_default() {
        let config = RecoveryConfig {
            default_strategy: None,
            ..RecoveryConfig::default()
        };
        let m = RecoveryManager::new(config).unwrap();
        let result = m.execute(|| async { Ok::<_, BoxError>(()) }, "op", Some("nope")).await;
        assert!(!result.success);
        assert!(matches!(result.error, Some(RecoveryError::StrategyNotFound(ref n)) if n == "nope"));
        assert!(result.attempts.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_strategy_uses_default() {
        let m = manager();
        let result = m.execute(|| async { Ok::<_, BoxError>(()) }, "op", Some("nope")).await;
        assert!(result.success);
        assert_eq!(result.context.strategy, DEFAULT_STRATEGY);
    }

    #[tokio::test]
    async fn test_add_strategy_validates() {
        let m = manager();
        let bad = RecoveryStrategy::default().with_retry(RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        });
        assert!(matches!(m.add_strategy("bad", bad), Err(RecoveryError::InvalidConfig(_))));
        assert!(m.add_strategy("", RecoveryStrategy::default()).is_err());

        m.add_strategy("api", RecoveryStrategy::default()).unwrap();
        assert_eq!(m.strategy_names(), vec!["api"]);
        assert!(m.remove_strategy("api"));
        assert!(!m.remove_strategy("api"));
    }

    #[tokio::test]
    async fn test_fallback_type_mismatch_reported() {
        let m = manager();
        m.add_strategy(
            "typed",
            RecoveryStrategy::default()
                .with_retry(fast_retry(1))
                .with_fallback(Fallback::value(1u8)),
        )
        .unwrap();

        let result = m
            .execute(|| async { Err::<String, _>("ECONNREFUSED") }, "op", Some("typed"))
            .await;
        assert!(!result.success);
        assert_eq!(result.recovery_action, RecoveryAction::Fallback);
        assert!(matches!(result.error, Some(RecoveryError::FallbackType { .. })));
    }

    #[tokio::test]
    async fn test_rollback_checks_operation() {
        let m = manager();
        let id = m.create_checkpoint("op-a", &serde_json::json!({"x": 1}), "before").unwrap();

        assert_eq!(m.rollback_to_checkpoint("op-a", &id).unwrap(), serde_json::json!({"x": 1}));
        assert!(matches!(
            m.rollback_to_checkpoint("op-b", &id),
            Err(RecoveryError::CheckpointNotFound(_))
        ));
        assert!(matches!(
            m.rollback_to_checkpoint("op-a", "missing"),
            Err(RecoveryError::CheckpointNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_state_management_creates_initial_checkpoint() {
        let m = manager();
        m.add_strategy("stateful", RecoveryStrategy::default().with_state_management(true))
            .unwrap();
        let result = m.execute(|| async { Ok::<_, BoxError>(()) }, "op", Some("stateful")).await;
        assert_eq!(result.context.checkpoints.len(), 1);
        assert_eq!(m.state().get_checkpoints(Some("op")).len(), 1);
    }

    #[tokio::test]
    async fn test_active_entry_removed_after_execute() {
        let m = manager();
        let result = m
            .execute(
                || async { Err::<(), _>("ECONNREFUSED") },
                "op",
                None,
            )
            .await;
        assert!(!result.success);
        assert!(m.active_operations().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let m = manager();
        m.shutdown().await;
        assert!(m.is_shutting_down());

        let calls = AtomicU32::new(0);
        let result = m
            .execute(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, BoxError>(()) }
                },
                "op",
                None,
            )
            .await;
        assert!(matches!(result.error, Some(RecoveryError::ShuttingDown)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let m = manager();
        m.create_checkpoint("op", &1, "one").unwrap();
        m.execute(|| async { Ok::<_, BoxError>(()) }, "op", None).await;
        m.reset();
        assert_eq!(m.get_stats().total_operations, 0);
        assert!(m.state().is_empty());
    }

    fn guarded_strategy() -> RecoveryStrategy {
        RecoveryStrategy::default()
            .with_retry(fast_retry(1))
            .with_circuit_breaker(CircuitBreakerConfig {
                failure_threshold: 1,
                minimum_throughput: 1,
                recovery_timeout_ms: 60_000,
                ..CircuitBreakerConfig::default()
            })
    }

    #[tokio::test]
    async fn test_reset_closes_open_breakers() {
        let m = manager();
        m.add_strategy("guarded", guarded_strategy()).unwrap();

        let calls = AtomicU32::new(0);
        let failing = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("ECONNREFUSED") }
        };
        m.execute(failing, "op", Some("guarded")).await;
        assert_eq!(m.circuit_state("strategy:guarded"), Some(CircuitState::Open));
        assert_eq!(m.get_health_status().details.circuit_breakers.len(), 1);

        m.reset();
        assert_eq!(m.circuit_state("strategy:guarded"), None);
        assert!(m.circuit_snapshots().is_empty());

        let result = m.execute(failing, "op", Some("guarded")).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(m.circuit_state("strategy:guarded"), Some(CircuitState::Open));
    }

    #[tokio::test]
    async fn test_idle_operation_breakers_pruned() {
        let config = RecoveryConfig {
            default_strategy: Some(StrategyConfig {
                retry: fast_retry(1),
                circuit_breaker: Some(CircuitBreakerConfig {
                    monitoring_window_ms: 200,
                    ..CircuitBreakerConfig::default()
                }),
                ..StrategyConfig::default()
            }),
            ..RecoveryConfig::default()
        };
        let m = RecoveryManager::new(config).unwrap();
        m.add_strategy("guarded", guarded_strategy()).unwrap();

        for i in 0..5 {
            m.execute(|| async { Ok::<_, BoxError>(()) }, &format!("op-{i}"), None)
                .await;
        }
        m.execute(|| async { Ok::<_, BoxError>(()) }, "named", Some("guarded"))
            .await;
        assert_eq!(m.circuit_snapshots().len(), 6);
        assert_eq!(m.prune_idle_breakers(), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        m.execute(|| async { Ok::<_, BoxError>(()) }, "fresh", None).await;

        let keys: Vec<String> = m.circuit_snapshots().into_iter().map(|s| s.key).collect();
        assert!(keys.contains(&"operation:fresh".to_string()));
        assert!(keys.contains(&"strategy:guarded".to_string()));
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = RecoveryConfig::default();
        config.state.max_checkpoints = 0;
        assert!(matches!(RecoveryManager::new(config), Err(RecoveryError::InvalidConfig(_))));
    }
}

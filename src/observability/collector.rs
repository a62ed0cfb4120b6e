//! In-process metrics collection.
//!
//! # Responsibilities
//! - Append operation, error and recovery records
//! - Aggregate them into `RecoveryStats`, overall, per window, or per operation
//! - Discard records older than the retention period
//! - Snapshot raw records for external persistence
//!
//! # Design Decisions
//! - Append happens under a write lock, so a sweep never sees a partial record
//! - Retention is time-based; sweeps run lazily on record and from an optional interval task
//! - Nothing is persisted implicitly

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::config::MetricsConfig;
use crate::lifecycle::Shutdown;
use crate::observability::events::{EventBus, RecoveryEvent};
use crate::observability::metrics;
use crate::recovery::types::RecoveryAction;
use crate::resilience::classifier::{ErrorCategory, ErrorClassification, ErrorSeverity};

/// Outcome of one `execute()` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationMetric {
    pub operation_id: String,
    pub timestamp: SystemTime,
    pub success: bool,
    pub duration: Duration,
    pub error: Option<String>,
}

/// A classified terminal error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetric {
    pub timestamp: SystemTime,
    pub operation_id: Option<String>,
    pub error: String,
    pub classification: ErrorClassification,
}

/// A recovery action taken on behalf of an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryMetric {
    pub timestamp: SystemTime,
    pub action: RecoveryAction,
    pub success: bool,
    pub duration: Duration,
}

/// Aggregated view over a set of records.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryStats {
    pub total_operations: usize,
    pub successful_operations: usize,
    pub failed_operations: usize,
    /// `0.0` when no operations were recorded.
    pub success_rate: f64,
    pub average_duration: Duration,
    pub total_errors: usize,
    pub errors_by_category: BTreeMap<ErrorCategory, usize>,
    pub errors_by_severity: BTreeMap<ErrorSeverity, usize>,
    pub total_recoveries: usize,
    pub successful_recoveries: usize,
    pub recoveries_by_action: BTreeMap<RecoveryAction, usize>,
    pub average_recovery_duration: Duration,
}

/// History of one operation id.
#[derive(Debug, Clone, Serialize)]
pub struct OperationStats {
    pub operation_id: String,
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    pub success_rate: f64,
    pub average_duration: Duration,
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub last_error: Option<String>,
    pub last_seen: SystemTime,
}

/// Raw records for export and import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub exported_at: SystemTime,
    pub operations: Vec<OperationMetric>,
    pub errors: Vec<ErrorMetric>,
    pub recoveries: Vec<RecoveryMetric>,
}

#[derive(Debug, Default)]
struct Records {
    operations: VecDeque<OperationMetric>,
    errors: VecDeque<ErrorMetric>,
    recoveries: VecDeque<RecoveryMetric>,
}

/// Time-windowed aggregator of recovery outcomes.
#[derive(Debug)]
pub struct MetricsCollector {
    config: MetricsConfig,
    records: RwLock<Records>,
    last_sweep: Mutex<Instant>,
    events: EventBus,
    shutdown: Shutdown,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl MetricsCollector {
    pub fn new(config: MetricsConfig, events: EventBus) -> Self {
        Self {
            config,
            records: RwLock::new(Records::default()),
            last_sweep: Mutex::new(Instant::now()),
            events,
            shutdown: Shutdown::new(),
            sweeper: Mutex::new(None),
        }
    }

    pub fn record_operation(&self, operation_id: &str, success: bool, duration: Duration, error: Option<&str>) {
        let record = OperationMetric {
            operation_id: operation_id.to_string(),
            timestamp: SystemTime::now(),
            success,
            duration,
            error: error.map(str::to_string),
        };
        self.write().operations.push_back(record);
        self.maybe_sweep();

        self.events.emit(RecoveryEvent::OperationRecorded {
            operation_id: operation_id.to_string(),
            success,
            duration,
        });
    }

    pub fn record_error(&self, error: &str, classification: ErrorClassification, operation_id: Option<&str>) {
        let record = ErrorMetric {
            timestamp: SystemTime::now(),
            operation_id: operation_id.map(str::to_string),
            error: error.to_string(),
            classification,
        };
        self.write().errors.push_back(record);
        self.maybe_sweep();
        metrics::record_error(&classification);

        self.events.emit(RecoveryEvent::ErrorRecorded {
            category: classification.category,
            severity: classification.severity,
            message: error.to_string(),
        });
    }

    pub fn record_recovery(&self, action: RecoveryAction, success: bool, duration: Duration) {
        let record = RecoveryMetric {
            timestamp: SystemTime::now(),
            action,
            success,
            duration,
        };
        self.write().recoveries.push_back(record);
        self.maybe_sweep();

        self.events.emit(RecoveryEvent::RecoveryRecorded {
            action,
            success,
            duration,
        });
    }

    /// Aggregate every retained record.
    pub fn get_stats(&self) -> RecoveryStats {
        let records = self.read();
        aggregate(
            records.operations.iter(),
            records.errors.iter(),
            records.recoveries.iter(),
        )
    }

    /// Aggregate records with `start <= timestamp <= end`.
    pub fn get_detailed_stats(&self, start: SystemTime, end: SystemTime) -> RecoveryStats {
        let in_window = |t: &SystemTime| *t >= start && *t <= end;
        let records = self.read();
        aggregate(
            records.operations.iter().filter(|r| in_window(&r.timestamp)),
            records.errors.iter().filter(|r| in_window(&r.timestamp)),
            records.recoveries.iter().filter(|r| in_window(&r.timestamp)),
        )
    }

    pub fn get_operation_stats(&self, operation_id: &str) -> Option<OperationStats> {
        let records = self.read();
        let history: Vec<&OperationMetric> = records
            .operations
            .iter()
            .filter(|r| r.operation_id == operation_id)
            .collect();
        let last = history.last()?;

        let total = history.len();
        let successes = history.iter().filter(|r| r.success).count();
        let durations = history.iter().map(|r| r.duration);
        let sum: Duration = durations.clone().sum();

        Some(OperationStats {
            operation_id: operation_id.to_string(),
            total,
            successes,
            failures: total - successes,
            success_rate: successes as f64 / total as f64,
            average_duration: average(sum, total),
            min_duration: durations.clone().min().unwrap_or_default(),
            max_duration: durations.max().unwrap_or_default(),
            last_error: history.iter().rev().find_map(|r| r.error.clone()),
            last_seen: last.timestamp,
        })
    }

    pub fn export_metrics(&self) -> MetricsSnapshot {
        let records = self.read();
        MetricsSnapshot {
            exported_at: SystemTime::now(),
            operations: records.operations.iter().cloned().collect(),
            errors: records.errors.iter().cloned().collect(),
            recoveries: records.recoveries.iter().cloned().collect(),
        }
    }

    /// Merge exported records, then apply retention.
    pub fn import_metrics(&self, snapshot: MetricsSnapshot) {
        {
            let mut records = self.write();
            records.operations.extend(snapshot.operations);
            records.errors.extend(snapshot.errors);
            records.recoveries.extend(snapshot.recoveries);
            records.operations.make_contiguous().sort_by_key(|r| r.timestamp);
            records.errors.make_contiguous().sort_by_key(|r| r.timestamp);
            records.recoveries.make_contiguous().sort_by_key(|r| r.timestamp);
        }
        self.prune(SystemTime::now());
    }

    /// Drop records older than the retention period, relative to `now`.
    pub fn prune(&self, now: SystemTime) -> usize {
        let Some(cutoff) = now.checked_sub(self.config.retention()) else {
            return 0;
        };

        let mut records = self.write();
        let before = records.operations.len() + records.errors.len() + records.recoveries.len();
        records.operations.retain(|r| r.timestamp >= cutoff);
        records.errors.retain(|r| r.timestamp >= cutoff);
        records.recoveries.retain(|r| r.timestamp >= cutoff);
        let after = records.operations.len() + records.errors.len() + records.recoveries.len();
        drop(records);

        let removed = before - after;
        if removed > 0 {
            tracing::debug!(removed, "Pruned expired metrics records");
        }
        removed
    }

    pub fn clear(&self) {
        let mut records = self.write();
        *records = Records::default();
    }

    /// Spawn the periodic retention sweep. Requires a tokio runtime.
    pub fn start_sweeper(self: &Arc<Self>) {
        let mut slot = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let mut shutdown = self.shutdown.subscribe();
        let interval = self.config.sweep_interval().max(Duration::from_millis(10));

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match weak.upgrade() {
                            Some(collector) => {
                                collector.prune(SystemTime::now());
                            }
                            None => break,
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Metrics sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        }));
    }

    pub fn is_sweeping(&self) -> bool {
        let slot = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Stop the sweep task and release all records.
    pub fn destroy(&self) {
        self.shutdown.trigger();
        if let Some(handle) = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
        self.clear();
    }

    fn maybe_sweep(&self) {
        let due = {
            let mut last = self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner);
            if last.elapsed() >= self.config.sweep_interval() {
                *last = Instant::now();
                true
            } else {
                false
            }
        };
        if due {
            self.prune(SystemTime::now());
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Records> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Records> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for MetricsCollector {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

fn average(total: Duration, count: usize) -> Duration {
    if count == 0 {
        Duration::ZERO
    } else {
        let nanos = total.as_nanos() / count as u128;
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

fn aggregate<'a>(
    operations: impl Iterator<Item = &'a OperationMetric>,
    errors: impl Iterator<Item = &'a ErrorMetric>,
    recoveries: impl Iterator<Item = &'a RecoveryMetric>,
) -> RecoveryStats {
    let mut stats = RecoveryStats::default();

    let mut duration_sum = Duration::ZERO;
    for op in operations {
        stats.total_operations += 1;
        if op.success {
            stats.successful_operations += 1;
        }
        duration_sum += op.duration;
    }
    stats.failed_operations = stats.total_operations - stats.successful_operations;
    if stats.total_operations > 0 {
        stats.success_rate = stats.successful_operations as f64 / stats.total_operations as f64;
    }
    stats.average_duration = average(duration_sum, stats.total_operations);

    for err in errors {
        stats.total_errors += 1;
        *stats.errors_by_category.entry(err.classification.category).or_default() += 1;
        *stats.errors_by_severity.entry(err.classification.severity).or_default() += 1;
    }

    let mut recovery_sum = Duration::ZERO;
    for rec in recoveries {
        stats.total_recoveries += 1;
        if rec.success {
            stats.successful_recoveries += 1;
        }
        *stats.recoveries_by_action.entry(rec.action).or_default() += 1;
        recovery_sum += rec.duration;
    }
    stats.average_recovery_duration = average(recovery_sum, stats.total_recoveries);

    stats
}

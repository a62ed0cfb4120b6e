//! Checkpoint storage and rollback.
//!
//! # Responsibilities
//! - Snapshot caller state under an operation id (deep copy via serialization)
//! - Return stored snapshots on rollback; applying them is the caller's job
//! - Bound memory: per-operation count cap and a global byte budget
//!
//! # Design Decisions
//! - Per-operation lists in a DashMap; the entry lock serializes insert and eviction for one id
//! - Oldest-first eviction, ordered by a creation sequence rather than wall clock
//! - Budget eviction never removes the checkpoint that triggered it

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::config::StateConfig;
use crate::error::{RecoveryError, Result};
use crate::observability::metrics;
use crate::state::codec::{CheckpointCodec, DeflateCodec, PlainCodec};

/// Fixed bookkeeping cost charged per checkpoint.
const CHECKPOINT_OVERHEAD_BYTES: usize = 64;

/// An immutable snapshot of caller state.
#[derive(Debug, Clone, Serialize)]
pub struct StateCheckpoint {
    pub id: String,
    pub operation_id: String,
    pub description: String,
    pub created_at: SystemTime,
    /// Approximate bytes charged against the memory budget.
    pub size_bytes: usize,
    #[serde(skip)]
    sequence: u64,
    #[serde(skip)]
    snapshot: Arc<[u8]>,
}

impl StateCheckpoint {
    /// Creation order across the whole store.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Store summary.
#[derive(Debug, Clone, Serialize)]
pub struct StateStats {
    pub total_checkpoints: usize,
    pub total_operations: usize,
    pub per_operation: BTreeMap<String, usize>,
    pub memory_usage_bytes: usize,
    pub memory_budget_bytes: usize,
    pub codec: &'static str,
}

/// Owns all checkpoints for one recovery manager.
#[derive(Debug)]
pub struct StateManager {
    config: StateConfig,
    codec: Arc<dyn CheckpointCodec>,
    checkpoints: DashMap<String, VecDeque<StateCheckpoint>>,
    /// checkpoint id → operation id
    index: DashMap<String, String>,
    memory_bytes: AtomicUsize,
    sequence: AtomicU64,
}

impl StateManager {
    /// Create a store; `compression` selects the deflate codec.
    pub fn new(config: StateConfig) -> Self {
        let codec: Arc<dyn CheckpointCodec> = if config.compression {
            Arc::new(DeflateCodec::default())
        } else {
            Arc::new(PlainCodec)
        };
        Self::with_codec(config, codec)
    }

    /// Create a store with a custom codec.
    pub fn with_codec(config: StateConfig, codec: Arc<dyn CheckpointCodec>) -> Self {
        Self {
            config,
            codec,
            checkpoints: DashMap::new(),
            index: DashMap::new(),
            memory_bytes: AtomicUsize::new(0),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    /// Snapshot `state` for `operation_id`.
    pub fn create_checkpoint<S>(&self, operation_id: &str, state: &S, description: &str) -> Result<StateCheckpoint>
    where
        S: Serialize + ?Sized,
    {
        let raw = serde_json::to_vec(state)?;
        let encoded = self.codec.encode(&raw)?;
        let size_bytes = encoded.len() + description.len() + operation_id.len() + CHECKPOINT_OVERHEAD_BYTES;

        let checkpoint = StateCheckpoint {
            id: Uuid::new_v4().to_string(),
            operation_id: operation_id.to_string(),
            description: description.to_string(),
            created_at: SystemTime::now(),
            size_bytes,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            snapshot: encoded.into(),
        };

        let evicted = {
            let mut list = self.checkpoints.entry(operation_id.to_string()).or_default();
            self.index.insert(checkpoint.id.clone(), operation_id.to_string());
            list.push_back(checkpoint.clone());
            self.memory_bytes.fetch_add(size_bytes, Ordering::Relaxed);

            let mut evicted = Vec::new();
            while list.len() > self.config.max_checkpoints.max(1) {
                match list.pop_front() {
                    Some(old) => evicted.push(old),
                    None => break,
                }
            }
            evicted
        };

        for old in &evicted {
            self.forget(old);
            tracing::debug!(
                operation_id = %operation_id,
                checkpoint_id = %old.id,
                "Evicted oldest checkpoint (per-operation cap)"
            );
        }

        self.enforce_memory_budget(&checkpoint.id);
        metrics::record_checkpoint_count(self.index.len());

        tracing::debug!(
            operation_id = %operation_id,
            checkpoint_id = %checkpoint.id,
            size_bytes,
            codec = self.codec.name(),
            "Checkpoint created"
        );

        Ok(checkpoint)
    }

    /// Restore the snapshot stored under `checkpoint_id`.
    pub fn rollback<T: DeserializeOwned>(&self, checkpoint_id: &str) -> Result<T> {
        let checkpoint = self
            .get_checkpoint(checkpoint_id)
            .ok_or_else(|| RecoveryError::CheckpointNotFound(checkpoint_id.to_string()))?;
        let raw = self.codec.decode(&checkpoint.snapshot)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Restore a snapshot as untyped JSON.
    pub fn rollback_value(&self, checkpoint_id: &str) -> Result<serde_json::Value> {
        self.rollback(checkpoint_id)
    }

    /// Drop one operation's checkpoints, or all of them. Returns how many were removed.
    pub fn clear_checkpoints(&self, operation_id: Option<&str>) -> usize {
        let removed: Vec<StateCheckpoint> = match operation_id {
            Some(op) => self
                .checkpoints
                .remove(op)
                .map(|(_, list)| list.into_iter().collect())
                .unwrap_or_default(),
            None => {
                let keys: Vec<String> = self.checkpoints.iter().map(|e| e.key().clone()).collect();
                keys.iter()
                    .filter_map(|k| self.checkpoints.remove(k))
                    .flat_map(|(_, list)| list.into_iter())
                    .collect()
            }
        };

        for checkpoint in &removed {
            self.forget(checkpoint);
        }
        metrics::record_checkpoint_count(self.index.len());
        removed.len()
    }

    /// Checkpoints for one operation, or all of them, oldest first.
    pub fn get_checkpoints(&self, operation_id: Option<&str>) -> Vec<StateCheckpoint> {
        match operation_id {
            Some(op) => self
                .checkpoints
                .get(op)
                .map(|list| list.iter().cloned().collect())
                .unwrap_or_default(),
            None => {
                let mut all: Vec<StateCheckpoint> = self
                    .checkpoints
                    .iter()
                    .flat_map(|e| e.value().iter().cloned().collect::<Vec<_>>())
                    .collect();
                all.sort_by_key(|c| c.sequence);
                all
            }
        }
    }

    pub fn get_checkpoint(&self, checkpoint_id: &str) -> Option<StateCheckpoint> {
        let operation_id = self.index.get(checkpoint_id)?.value().clone();
        let list = self.checkpoints.get(&operation_id)?;
        let found = list.iter().find(|c| c.id == checkpoint_id).cloned();
        found
    }

    pub fn get_latest_checkpoint(&self, operation_id: &str) -> Option<StateCheckpoint> {
        self.checkpoints.get(operation_id)?.back().cloned()
    }

    /// Number of stored checkpoints.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn memory_usage(&self) -> usize {
        self.memory_bytes.load(Ordering::Relaxed)
    }

    pub fn get_stats(&self) -> StateStats {
        let per_operation: BTreeMap<String, usize> = self
            .checkpoints
            .iter()
            .map(|e| (e.key().clone(), e.value().len()))
            .collect();
        StateStats {
            total_checkpoints: per_operation.values().sum(),
            total_operations: per_operation.len(),
            per_operation,
            memory_usage_bytes: self.memory_usage(),
            memory_budget_bytes: self.config.max_memory_bytes,
            codec: self.codec.name(),
        }
    }

    fn forget(&self, checkpoint: &StateCheckpoint) {
        self.index.remove(&checkpoint.id);
        self.memory_bytes.fetch_sub(checkpoint.size_bytes, Ordering::Relaxed);
    }

    fn enforce_memory_budget(&self, protected_id: &str) {
        while self.memory_usage() > self.config.max_memory_bytes {
            let oldest = self
                .checkpoints
                .iter()
                .filter_map(|e| {
                    e.value()
                        .iter()
                        .find(|c| c.id != protected_id)
                        .map(|c| (c.sequence, e.key().clone()))
                })
                .min();

            let Some((sequence, operation_id)) = oldest else {
                break;
            };

            let removed = self.checkpoints.get_mut(&operation_id).and_then(|mut list| {
                let pos = list.iter().position(|c| c.sequence == sequence)?;
                list.remove(pos)
            });
            self.checkpoints.remove_if(&operation_id, |_, list| list.is_empty());

            if let Some(checkpoint) = removed {
                self.forget(&checkpoint);
                tracing::debug!(
                    operation_id = %operation_id,
                    checkpoint_id = %checkpoint.id,
                    memory_bytes = self.memory_usage(),
                    "Evicted oldest checkpoint (memory budget)"
                );
            }
        }
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new(StateConfig::default())
    }
}

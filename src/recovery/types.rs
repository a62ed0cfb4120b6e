//! Per-call recovery records.
//!
//! A `RecoveryContext` is created fresh for every `execute()` call and owned by
//! it; `RecoveryAttempt`s are appended in attempt order and never mutated; the
//! `RecoveryResult` is the terminal artifact handed back to the caller.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::error::{RecoveryError, Result};
use crate::resilience::classifier::ErrorClassification;
use crate::state::StateCheckpoint;

/// What the engine did to obtain (or fail to obtain) a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// First attempt succeeded.
    None,
    Retry,
    Fallback,
    /// Rejected by an open circuit before any attempt ran.
    CircuitBreaker,
}

impl RecoveryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryAction::None => "none",
            RecoveryAction::Retry => "retry",
            RecoveryAction::Fallback => "fallback",
            RecoveryAction::CircuitBreaker => "circuit_breaker",
        }
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State owned by one `execute()` call.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryContext {
    pub operation_id: String,
    /// Name of the resolved strategy (`default` for the default strategy).
    pub strategy: String,
    /// Last attempt number started.
    pub attempt: u32,
    pub start_time: SystemTime,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub checkpoints: Vec<StateCheckpoint>,
}

impl RecoveryContext {
    pub fn new(operation_id: impl Into<String>, strategy: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            strategy: strategy.into(),
            attempt: 0,
            start_time: SystemTime::now(),
            metadata: BTreeMap::new(),
            checkpoints: Vec::new(),
        }
    }
}

/// One invocation of the operation or its fallback.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryAttempt {
    pub attempt: u32,
    pub timestamp: SystemTime,
    /// Rendered error when the attempt failed.
    pub error: Option<String>,
    pub classification: Option<ErrorClassification>,
    pub action: RecoveryAction,
    pub success: bool,
    pub duration: Duration,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Terminal outcome of `execute()`.
#[derive(Debug)]
pub struct RecoveryResult<T> {
    pub success: bool,
    pub result: Option<T>,
    pub error: Option<RecoveryError>,
    pub attempts: Vec<RecoveryAttempt>,
    pub total_duration: Duration,
    pub recovery_action: RecoveryAction,
    pub context: RecoveryContext,
}

impl<T> RecoveryResult<T> {
    /// Convert into a plain `Result`, discarding the attempt history.
    pub fn into_result(self) -> Result<T> {
        match (self.result, self.error) {
            (Some(value), _) if self.success => Ok(value),
            (_, Some(error)) => Err(error),
            _ => Err(RecoveryError::InvalidConfig(
                "recovery finished without a result or an error".to_string(),
            )),
        }
    }

    /// Number of failed operation attempts (fallback excluded).
    pub fn failed_attempts(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| !a.success && a.action != RecoveryAction::Fallback)
            .count()
    }
}

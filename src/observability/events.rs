//! Lifecycle events.
//!
//! # Responsibilities
//! - Define the structured events emitted by the recovery engine
//! - Fan events out to any number of observers
//!
//! # Design Decisions
//! - Broadcast channel: emitting never blocks and never fails the caller
//! - Slow observers lag (and are told so by the channel) instead of applying backpressure
//! - `close()` detaches every observer; their receivers see the channel close

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::recovery::types::RecoveryAction;
use crate::resilience::classifier::{ErrorCategory, ErrorSeverity};

/// An observable lifecycle event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RecoveryEvent {
    Started {
        operation_id: String,
        strategy: String,
    },
    AttemptFailed {
        operation_id: String,
        attempt: u32,
        category: ErrorCategory,
        error: String,
        will_retry: bool,
        delay: Duration,
    },
    Succeeded {
        operation_id: String,
        attempts: usize,
        action: RecoveryAction,
        duration: Duration,
    },
    Failed {
        operation_id: String,
        attempts: usize,
        action: RecoveryAction,
        error: String,
        duration: Duration,
    },
    FallbackExecuted {
        operation_id: String,
        success: bool,
        duration: Duration,
    },
    RollbackExecuted {
        operation_id: String,
        checkpoint_id: String,
    },
    CircuitOpened {
        key: String,
        failures: usize,
    },
    CircuitHalfOpened {
        key: String,
    },
    CircuitClosed {
        key: String,
    },
    OperationRecorded {
        operation_id: String,
        success: bool,
        duration: Duration,
    },
    ErrorRecorded {
        category: ErrorCategory,
        severity: ErrorSeverity,
        message: String,
    },
    RecoveryRecorded {
        action: RecoveryAction,
        success: bool,
        duration: Duration,
    },
}

impl RecoveryEvent {
    /// Dotted event name.
    pub fn name(&self) -> &'static str {
        match self {
            RecoveryEvent::Started { .. } => "recovery.started",
            RecoveryEvent::AttemptFailed { .. } => "attempt.failed",
            RecoveryEvent::Succeeded { .. } => "recovery.success",
            RecoveryEvent::Failed { .. } => "recovery.failure",
            RecoveryEvent::FallbackExecuted { .. } => "fallback.executed",
            RecoveryEvent::RollbackExecuted { .. } => "rollback.executed",
            RecoveryEvent::CircuitOpened { .. } => "circuit.opened",
            RecoveryEvent::CircuitHalfOpened { .. } => "circuit.half_opened",
            RecoveryEvent::CircuitClosed { .. } => "circuit.closed",
            RecoveryEvent::OperationRecorded { .. } => "operation.recorded",
            RecoveryEvent::ErrorRecorded { .. } => "error.recorded",
            RecoveryEvent::RecoveryRecorded { .. } => "recovery.recorded",
        }
    }

    /// Operation the event belongs to, when it belongs to one.
    pub fn operation_id(&self) -> Option<&str> {
        match self {
            RecoveryEvent::Started { operation_id, .. }
            | RecoveryEvent::AttemptFailed { operation_id, .. }
            | RecoveryEvent::Succeeded { operation_id, .. }
            | RecoveryEvent::Failed { operation_id, .. }
            | RecoveryEvent::FallbackExecuted { operation_id, .. }
            | RecoveryEvent::RollbackExecuted { operation_id, .. }
            | RecoveryEvent::OperationRecorded { operation_id, .. } => Some(operation_id),
            _ => None,
        }
    }
}

/// Cloneable handle for emitting and observing events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: Arc<RwLock<Option<broadcast::Sender<RecoveryEvent>>>>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per observer.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx: Arc::new(RwLock::new(Some(tx))),
        }
    }

    /// Emit an event to every current observer.
    pub fn emit(&self, event: RecoveryEvent) {
        let guard = self.tx.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = guard.as_ref() {
            // No observers is not an error.
            let _ = tx.send(event);
        }
    }

    /// Register a new observer.
    ///
    /// On a closed bus the returned receiver is already closed.
    pub fn subscribe(&self) -> broadcast::Receiver<RecoveryEvent> {
        let guard = self.tx.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Number of attached observers.
    pub fn observer_count(&self) -> usize {
        let guard = self.tx.read().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(|tx| tx.receiver_count()).unwrap_or(0)
    }

    /// Detach all observers. Later emits are dropped.
    pub fn close(&self) {
        let mut guard = self.tx.write().unwrap_or_else(PoisonError::into_inner);
        guard.take();
    }

    pub fn is_closed(&self) -> bool {
        let guard = self.tx.read().unwrap_or_else(PoisonError::into_inner);
        guard.is_none()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

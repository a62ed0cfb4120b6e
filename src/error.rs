//! Error types for the recovery engine.

use thiserror::Error;

/// Boxed error produced by protected operations and fallbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while executing or managing recovery.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// No strategy registered under the name and no default strategy configured.
    #[error("Recovery strategy not found: {0}")]
    StrategyNotFound(String),

    /// Call rejected by an open circuit breaker.
    #[error("Circuit breaker is OPEN for {key}")]
    CircuitOpen { key: String },

    /// Rollback or lookup of an unknown checkpoint.
    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// Terminal error raised by the protected operation.
    #[error(transparent)]
    Operation(BoxError),

    /// The fallback itself failed.
    #[error("Fallback failed: {0}")]
    Fallback(BoxError),

    /// The fallback produced a value of a different type than the operation.
    #[error("Fallback produced a value that is not a {expected}")]
    FallbackType { expected: &'static str },

    /// Strategy or engine configuration rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Checkpoint state could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Checkpoint compression failed.
    #[error("Checkpoint codec error: {0}")]
    Codec(#[from] std::io::Error),

    /// The manager is shutting down and no longer accepts work.
    #[error("Recovery manager is shutting down")]
    ShuttingDown,
}

impl RecoveryError {
    /// Wrap an operation error.
    pub fn operation<E: Into<BoxError>>(error: E) -> Self {
        RecoveryError::Operation(error.into())
    }

    /// Whether this is a circuit-open rejection.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, RecoveryError::CircuitOpen { .. })
    }
}

/// Result type for recovery operations.
pub type Result<T> = std::result::Result<T, RecoveryError>;

//! Recovery engine library.
//!
//! Protects asynchronous operations with retries, circuit breaking, fallbacks
//! and state checkpoints.
//!
//! ```text
//!     caller ──▶ RecoveryManager::execute ──▶ [CircuitBreaker] ──▶ attempt loop ──▶ operation
//!                       │                                              │
//!                       │                         ErrorClassifier ◀────┤ failure
//!                       │                         RetryManager ────────┘ delay, retry
//!                       ▼
//!         MetricsCollector · StateManager · EventBus
//! ```

// Core subsystems
pub mod config;
pub mod error;
pub mod recovery;
pub mod resilience;
pub mod state;

// Cross-cutting concerns
pub mod health;
pub mod lifecycle;
pub mod observability;

pub use config::RecoveryConfig;
pub use error::{BoxError, RecoveryError, Result};
pub use lifecycle::Shutdown;
pub use recovery::{
    Fallback, RecoveryAction, RecoveryManager, RecoveryResult, RecoveryStrategy,
};

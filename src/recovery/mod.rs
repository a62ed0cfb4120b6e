//! Recovery orchestration subsystem.
//!
//! # Data Flow
//! ```text
//! Caller:
//!     → manager.rs execute(operation, id, strategy)
//!     → strategy.rs (retry config, breaker config, fallback)
//!     → resilience (classify, backoff, breaker)
//!     → types.rs RecoveryResult handed back
//! ```
//!
//! # Design Decisions
//! - One manager owns every breaker, checkpoint and metric it creates
//! - Operation failures never escape as `Err`; they are carried in the result

pub mod manager;
pub mod strategy;
pub mod types;

pub use manager::{ActiveOperation, RecoveryManager, DEFAULT_STRATEGY};
pub use strategy::{Fallback, RecoveryStrategy};
pub use types::{RecoveryAction, RecoveryAttempt, RecoveryContext, RecoveryResult};

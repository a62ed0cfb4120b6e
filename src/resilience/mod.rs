//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Operation attempt fails:
//!     → classifier.rs (category, severity, recoverable?)
//!     → retries.rs (eligible for another attempt?)
//!     → backoff.rs (how long to wait)
//! Around the whole attempt loop:
//!     → circuit_breaker.rs (admit, record outcome, open on sustained failure)
//! ```
//!
//! # Design Decisions
//! - Classification is derived from the error message and never alters the error
//! - Non-recoverable errors stop retries immediately
//! - Circuit breaker prevents hammering a dependency that is already down

pub mod backoff;
pub mod circuit_breaker;
pub mod classifier;
pub mod retries;

pub use circuit_breaker::{CircuitBreaker, CircuitPermit, CircuitSnapshot, CircuitState};
pub use classifier::{classify, classify_message, ErrorCategory, ErrorClassification, ErrorSeverity};
pub use retries::RetryManager;

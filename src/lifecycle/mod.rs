//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     shutdown() called → stop admitting work → drain active operations → clear state
//!
//! Background tasks:
//!     subscribe() → select on the shutdown signal → exit loop
//! ```
//!
//! # Design Decisions
//! - In-flight work is never aborted; draining only waits
//! - Shutdown has a deadline: whatever remains after it is discarded

pub mod shutdown;

pub use shutdown::{drain, DrainOutcome, Shutdown};

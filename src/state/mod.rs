//! Checkpoint state subsystem.
//!
//! # Data Flow
//! ```text
//! create_checkpoint(op, state)
//!     → serde_json (deep copy)
//!     → codec.rs (plain or deflate)
//!     → manager.rs store (per-operation list, oldest evicted first)
//!
//! rollback(id)
//!     → manager.rs lookup
//!     → codec.rs decode
//!     → deserialize into the caller's type
//! ```
//!
//! # Design Decisions
//! - In-memory only; checkpoints do not survive a restart
//! - Rollback returns the snapshot and never touches live application state

pub mod codec;
pub mod manager;

pub use codec::{CheckpointCodec, DeflateCodec, PlainCodec};
pub use manager::{StateCheckpoint, StateManager, StateStats};

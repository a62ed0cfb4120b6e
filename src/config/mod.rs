//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RecoveryConfig (validated, immutable)
//!     → RecoveryManager::new
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; strategies added later go through the same validation
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::BackoffStrategy;
pub use schema::CircuitBreakerConfig;
pub use schema::HealthConfig;
pub use schema::MetricsConfig;
pub use schema::ObservabilityConfig;
pub use schema::RecoveryConfig;
pub use schema::RetryConfig;
pub use schema::StateConfig;
pub use schema::StrategyConfig;

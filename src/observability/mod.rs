//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! RecoveryManager, CircuitBreaker, MetricsCollector produce:
//!     → events.rs (lifecycle events on a broadcast bus)
//!     → collector.rs (in-process records and aggregate stats)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → logging.rs (event logger renders events as tracing output)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Any caller holding an event receiver
//! ```
//!
//! # Design Decisions
//! - Structured logging via tracing fields, never string interpolation alone
//! - Event emission never blocks the operation being recovered
//! - Metrics are cheap (atomic increments)

pub mod collector;
pub mod events;
pub mod logging;
pub mod metrics;

pub use collector::{MetricsCollector, MetricsSnapshot, OperationStats, RecoveryStats};
pub use events::{EventBus, RecoveryEvent};

//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Render lifecycle events as log lines for observers that only read logs
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - `RUST_LOG` overrides the configured level
//! - The library never installs a subscriber; only the binary calls `init_logging`

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::observability::events::RecoveryEvent;

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("recovery_engine={level}").into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Log every event received until the bus closes.
pub fn spawn_event_logger(mut events: broadcast::Receiver<RecoveryEvent>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut logged = 0;
        loop {
            match events.recv().await {
                Ok(event) => {
                    log_event(&event);
                    logged += 1;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagging, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::debug!(logged, "Event logger stopped");
        logged
    })
}

fn log_event(event: &RecoveryEvent) {
    let name = event.name();
    match event {
        RecoveryEvent::CircuitOpened { key, failures } => {
            tracing::warn!(event = name, key = %key, failures, "Circuit opened");
        }
        RecoveryEvent::CircuitHalfOpened { key } | RecoveryEvent::CircuitClosed { key } => {
            tracing::info!(event = name, key = %key, "Circuit state changed");
        }
        RecoveryEvent::Failed {
            operation_id,
            attempts,
            error,
            ..
        } => {
            tracing::warn!(event = name, operation_id = %operation_id, attempts, error = %error, "Recovery event");
        }
        RecoveryEvent::ErrorRecorded {
            category, severity, ..
        } => {
            tracing::debug!(event = name, category = %category, severity = %severity, "Recovery event");
        }
        other => match serde_json::to_string(other) {
            Ok(payload) => tracing::debug!(event = name, payload = %payload, "Recovery event"),
            Err(_) => tracing::debug!(event = name, "Recovery event"),
        },
    }
}

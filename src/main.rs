//! Recovery engine driver.
//!
//! Runs a batch of simulated validation calls through a `RecoveryManager` and
//! reports the resulting stats and health. Useful for exercising a strategy
//! configuration before wiring it into a service.
//!
//! ```text
//! config (TOML, optional)
//!     → RecoveryManager::new
//!     → register built-in `validation` strategy (breaker + cached fallback)
//!     → N concurrent execute() calls, failures injected at --failure-rate
//!     → print stats + health → shutdown
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures_util::future::join_all;

use recovery_engine::config::loader::load_config;
use recovery_engine::config::{BackoffStrategy, CircuitBreakerConfig, RecoveryConfig, RetryConfig};
use recovery_engine::observability::logging::{init_logging, spawn_event_logger};
use recovery_engine::observability::metrics::init_metrics;
use recovery_engine::{Fallback, RecoveryManager, RecoveryStrategy};

const BUILTIN_STRATEGY: &str = "validation";

const INJECTED_ERRORS: &[&str] = &[
    "connect ECONNREFUSED 127.0.0.1:8080",
    "socket hang up",
    "request timed out after 5000ms",
    "503 Service Unavailable",
    "401 Unauthorized",
];

#[derive(Parser, Debug)]
#[command(name = "recovery-engine")]
#[command(about = "Drive simulated operations through the recovery engine", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of simulated operations
    #[arg(short = 'n', long, default_value_t = 50)]
    operations: usize,

    /// Probability that a single attempt fails
    #[arg(short, long, default_value_t = 0.3)]
    failure_rate: f64,

    /// Strategy to run operations under
    #[arg(short, long, default_value = BUILTIN_STRATEGY)]
    strategy: String,

    /// Print stats and health as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RecoveryConfig::default(),
    };

    init_logging(&config.observability.log_level);
    tracing::info!("recovery-engine v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let manager = Arc::new(RecoveryManager::new(config)?);
    let event_logger = spawn_event_logger(manager.subscribe());

    if !manager.strategy_names().iter().any(|n| n == BUILTIN_STRATEGY) {
        manager.add_strategy(BUILTIN_STRATEGY, builtin_strategy())?;
    }

    let failure_rate = cli.failure_rate.clamp(0.0, 1.0);
    tracing::info!(
        operations = cli.operations,
        failure_rate,
        strategy = %cli.strategy,
        "Running simulated operations"
    );

    let calls = (0..cli.operations).map(|i| {
        let manager = Arc::clone(&manager);
        let strategy = cli.strategy.clone();
        async move {
            let operation_id = format!("validation-{i}");
            manager
                .execute(
                    || simulated_validation(failure_rate),
                    &operation_id,
                    Some(strategy.as_str()),
                )
                .await
        }
    });
    let results = join_all(calls).await;
    let succeeded = results.iter().filter(|r| r.success).count();

    let stats = manager.get_stats();
    let health = manager.get_health_status();

    if cli.json {
        let report = serde_json::json!({
            "stats": stats,
            "health": health,
            "checkpoints": manager.state().get_stats(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("operations:   {} ({} succeeded)", results.len(), succeeded);
        println!("success rate: {:.1}%", stats.success_rate * 100.0);
        println!("avg duration: {:?}", stats.average_duration);
        for (category, count) in &stats.errors_by_category {
            println!("errors[{category}]: {count}");
        }
        for (action, count) in &stats.recoveries_by_action {
            println!("recoveries[{action}]: {count}");
        }
        println!("health:       {}", health.status);
        for error in &health.errors {
            println!("  - {error}");
        }
    }

    manager.shutdown().await;
    let logged = event_logger.await.unwrap_or(0);
    tracing::info!(events = logged, "Shutdown complete");
    Ok(())
}

fn builtin_strategy() -> RecoveryStrategy {
    RecoveryStrategy::default()
        .with_retry(RetryConfig {
            strategy: BackoffStrategy::Exponential,
            max_attempts: 3,
            base_delay_ms: 20,
            max_delay_ms: 200,
            ..RetryConfig::default()
        })
        .with_circuit_breaker(CircuitBreakerConfig {
            failure_threshold: 10,
            recovery_timeout_ms: 1_000,
            minimum_throughput: 10,
            ..CircuitBreakerConfig::default()
        })
        .with_fallback(Fallback::value(String::from("cached-validation-result")))
}

async fn simulated_validation(failure_rate: f64) -> Result<String, String> {
    tokio::time::sleep(Duration::from_millis(fastrand::u64(1..10))).await;
    if fastrand::f64() < failure_rate {
        let message = INJECTED_ERRORS[fastrand::usize(..INJECTED_ERRORS.len())];
        Err(message.to_string())
    } else {
        Ok(String::from("valid"))
    }
}

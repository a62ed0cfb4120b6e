//! Shutdown coordination for the recovery engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
#[derive(Debug)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    triggered: AtomicBool,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: AtomicBool::new(false),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal. Returns `false` if it was already triggered.
    pub fn trigger(&self) -> bool {
        let first = !self.triggered.swap(true, Ordering::SeqCst);
        if first {
            let _ = self.tx.send(());
        }
        first
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// How a drain finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Drained,
    /// Deadline hit with this many items still pending.
    TimedOut { remaining: usize },
}

/// Poll `pending` until it reports zero or `deadline` elapses.
pub async fn drain<F>(pending: F, deadline: Duration, poll: Duration) -> DrainOutcome
where
    F: Fn() -> usize,
{
    let started = Instant::now();
    loop {
        let remaining = pending();
        if remaining == 0 {
            return DrainOutcome::Drained;
        }
        if started.elapsed() >= deadline {
            return DrainOutcome::TimedOut { remaining };
        }
        tracing::debug!(remaining, "Waiting for active operations to drain");
        tokio::time::sleep(poll.min(deadline.saturating_sub(started.elapsed()))).await;
    }
}

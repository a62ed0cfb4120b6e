//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: a single trial call tests whether it recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failures >= threshold and calls >= minimum throughput within window
//! Open → Half-Open: after recovery timeout
//! Half-Open → Closed: trial call succeeds (window cleared)
//! Half-Open → Open: trial call fails (timer restarts)
//! ```
//!
//! # Design Decisions
//! - One breaker per key (strategy name or operation id), shared by concurrent callers
//! - Fail fast in Open state (no waiting for timeout)
//! - Single trial in Half-Open; a dropped trial permit counts as a failure
//! - Counters live behind a mutex that is never held across an await

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;

use crate::config::CircuitBreakerConfig;
use crate::error::{RecoveryError, Result};
use crate::observability::events::{EventBus, RecoveryEvent};
use crate::observability::metrics;

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub key: String,
    pub state: CircuitState,
    /// Failures within the monitoring window.
    pub failures: usize,
    /// Successes within the monitoring window.
    pub successes: usize,
    /// Calls within the monitoring window.
    pub total: usize,
}

#[derive(Debug)]
enum Phase {
    Closed,
    Open { since: Instant },
    HalfOpen { trial_in_flight: bool },
}

enum Admission {
    Pass,
    Trial { half_opened: bool },
    Reject,
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    /// Rolling window of (finished_at, success).
    outcomes: VecDeque<(Instant, bool)>,
}

/// Admission-control state machine for one key.
#[derive(Debug)]
pub struct CircuitBreaker {
    key: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    events: EventBus,
}

impl CircuitBreaker {
    pub fn new(key: impl Into<String>, config: CircuitBreakerConfig, events: EventBus) -> Self {
        let key = key.into();
        metrics::record_circuit_state(&key, CircuitState::Closed);
        Self {
            key,
            config,
            inner: Mutex::new(Inner {
                phase: Phase::Closed,
                outcomes: VecDeque::new(),
            }),
            events,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `f` if the breaker admits the call, recording its outcome.
    pub async fn execute<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let permit = self.try_acquire()?;
        match f().await {
            Ok(value) => {
                permit.record_success();
                Ok(value)
            }
            Err(e) => {
                permit.record_failure();
                Err(e)
            }
        }
    }

    /// Ask for admission. Rejections carry `RecoveryError::CircuitOpen`.
    pub fn try_acquire(&self) -> Result<CircuitPermit<'_>> {
        let admission = {
            let mut inner = self.lock();
            match inner.phase {
                Phase::Closed => Admission::Pass,
                Phase::Open { since } if since.elapsed() < self.config.recovery_timeout() => {
                    Admission::Reject
                }
                Phase::Open { .. } => {
                    inner.phase = Phase::HalfOpen {
                        trial_in_flight: true,
                    };
                    Admission::Trial { half_opened: true }
                }
                Phase::HalfOpen {
                    trial_in_flight: true,
                } => Admission::Reject,
                Phase::HalfOpen {
                    trial_in_flight: false,
                } => {
                    inner.phase = Phase::HalfOpen {
                        trial_in_flight: true,
                    };
                    Admission::Trial { half_opened: false }
                }
            }
        };

        let trial = match admission {
            Admission::Pass => false,
            Admission::Reject => return Err(self.rejection()),
            Admission::Trial { half_opened } => {
                if half_opened {
                    self.on_transition(CircuitState::HalfOpen);
                    tracing::info!(key = %self.key, "Circuit breaker half-open, admitting trial call");
                    self.events.emit(RecoveryEvent::CircuitHalfOpened {
                        key: self.key.clone(),
                    });
                }
                true
            }
        };

        Ok(CircuitPermit {
            breaker: self,
            trial,
            done: false,
        })
    }

    /// Current state. An expired open timer reports half-open.
    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        match inner.phase {
            Phase::Closed => CircuitState::Closed,
            Phase::Open { since } if since.elapsed() >= self.config.recovery_timeout() => {
                CircuitState::HalfOpen
            }
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let state = self.state();
        let mut inner = self.lock();
        self.prune(&mut inner, Instant::now());
        let failures = inner.outcomes.iter().filter(|(_, ok)| !ok).count();
        let total = inner.outcomes.len();
        CircuitSnapshot {
            key: self.key.clone(),
            state,
            failures,
            successes: total - failures,
            total,
        }
    }

    /// Closed with no outcomes left in the monitoring window.
    pub fn is_idle(&self) -> bool {
        let mut inner = self.lock();
        self.prune(&mut inner, Instant::now());
        matches!(inner.phase, Phase::Closed) && inner.outcomes.is_empty()
    }

    /// Force the breaker closed and clear its counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.phase = Phase::Closed;
        inner.outcomes.clear();
        drop(inner);
        self.on_transition(CircuitState::Closed);
        tracing::debug!(key = %self.key, "Circuit breaker reset");
    }

    fn record(&self, trial: bool, success: bool) {
        let now = Instant::now();
        let mut inner = self.lock();

        if trial {
            if success {
                inner.phase = Phase::Closed;
                inner.outcomes.clear();
                drop(inner);
                self.on_transition(CircuitState::Closed);
                tracing::info!(key = %self.key, "Circuit breaker closed after successful trial");
                self.events.emit(RecoveryEvent::CircuitClosed {
                    key: self.key.clone(),
                });
            } else {
                inner.phase = Phase::Open { since: now };
                drop(inner);
                self.on_transition(CircuitState::Open);
                tracing::warn!(key = %self.key, "Circuit breaker trial failed, re-opening");
                self.events.emit(RecoveryEvent::CircuitOpened {
                    key: self.key.clone(),
                    failures: 1,
                });
            }
            return;
        }

        // Calls admitted while closed may finish after the circuit opened.
        if !matches!(inner.phase, Phase::Closed) {
            return;
        }

        inner.outcomes.push_back((now, success));
        self.prune(&mut inner, now);
        if success {
            return;
        }

        let failures = inner.outcomes.iter().filter(|(_, ok)| !ok).count();
        let total = inner.outcomes.len();
        if failures >= self.config.failure_threshold as usize
            && total >= self.config.minimum_throughput as usize
        {
            inner.phase = Phase::Open { since: now };
            drop(inner);
            self.on_transition(CircuitState::Open);
            tracing::warn!(
                key = %self.key,
                failures,
                total,
                threshold = self.config.failure_threshold,
                "Circuit breaker opened"
            );
            self.events.emit(RecoveryEvent::CircuitOpened {
                key: self.key.clone(),
                failures,
            });
        }
    }

    fn prune(&self, inner: &mut Inner, now: Instant) {
        let window = self.config.monitoring_window();
        while let Some((at, _)) = inner.outcomes.front() {
            if now.duration_since(*at) > window {
                inner.outcomes.pop_front();
            } else {
                break;
            }
        }
    }

    fn rejection(&self) -> RecoveryError {
        tracing::debug!(key = %self.key, "Circuit breaker rejected call");
        RecoveryError::CircuitOpen {
            key: self.key.clone(),
        }
    }

    fn on_transition(&self, state: CircuitState) {
        metrics::record_circuit_state(&self.key, state);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admission granted by a breaker. Report the outcome exactly once.
#[derive(Debug)]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    done: bool,
}

impl CircuitPermit<'_> {
    /// Whether this is the half-open trial call.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn record_success(mut self) {
        self.done = true;
        self.breaker.record(self.trial, true);
    }

    pub fn record_failure(mut self) {
        self.done = true;
        self.breaker.record(self.trial, false);
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if !self.done && self.trial {
            self.breaker.record(true, false);
        }
    }
}

//! Circuit Breaker
//!
//! Fail-fast guard around the generative model dependency. Repeated failures
//! open the circuit for a cooldown window, during which calls fail immediately
//! with a distinct error instead of attempting and timing out.

use std::time::Instant;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::BreakerConfig;
use crate::error::OrchestratorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: usize,
    window_start: Instant,
    opened_at: Instant,
    trial_in_flight: bool,
}

/// Circuit breaker for one downstream dependency.
///
/// Transitions: closed -> open after N consecutive failures within a window;
/// open -> half-open after a cooldown; half-open -> closed on trial success,
/// half-open -> open on trial failure.
pub struct CircuitBreaker {
    name: String,
    cfg: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, cfg: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            cfg,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                window_start: Instant::now(),
                opened_at: Instant::now(),
                trial_in_flight: false,
            }),
        }
    }

    /// Admit or reject a call. In the half-open state exactly one trial call
    /// is admitted at a time.
    pub fn try_acquire(&self) -> Result<(), OrchestratorError> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                if inner.opened_at.elapsed() >= self.cfg.cooldown() {
                    inner.state = BreakerState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!(breaker = %self.name, "circuit half-open, admitting trial call");
                    Ok(())
                } else {
                    Err(OrchestratorError::CircuitOpen(self.name.clone()))
                }
            }
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(OrchestratorError::CircuitOpen(self.name.clone()))
                } else {
                    inner.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::HalfOpen {
            info!(breaker = %self.name, "trial call succeeded, circuit closed");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.trial_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = now;
                inner.trial_in_flight = false;
                warn!(breaker = %self.name, "trial call failed, circuit re-opened");
                return;
            }
            BreakerState::Open => return,
            BreakerState::Closed => {}
        }

        // Failures only count as consecutive within the window.
        if now.duration_since(inner.window_start) > self.cfg.failure_window() {
            inner.consecutive_failures = 0;
            inner.window_start = now;
        }
        inner.consecutive_failures += 1;

        if inner.consecutive_failures >= self.cfg.failure_threshold {
            inner.state = BreakerState::Open;
            inner.opened_at = now;
            warn!(
                breaker = %self.name,
                failures = inner.consecutive_failures,
                cooldown_ms = self.cfg.cooldown_ms,
                "failure threshold reached, circuit opened"
            );
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }
}

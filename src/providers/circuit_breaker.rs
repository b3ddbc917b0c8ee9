use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Trips after `failure_threshold` consecutive provider faults and rejects calls
/// until `recovery_timeout` has passed, then lets a single probe through.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: Arc<RwLock<CircuitState>>,
    failure_threshold: u32,
    recovery_timeout: Duration,
    failure_count: Arc<AtomicU32>,
    name: String,
}

#[derive(Debug, Clone)]
pub enum CircuitState {
    Closed,
    Open { opened_at: Instant },
    HalfOpen,
}

impl CircuitState {
    pub fn label(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open { .. } => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: &'static str,
    pub failure_count: u32,
    pub failure_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        let name = name.into();
        debug!(
            "Creating circuit breaker '{}' with threshold {} and timeout {:?}",
            name, failure_threshold, recovery_timeout
        );

        Self {
            state: Arc::new(RwLock::new(CircuitState::Closed)),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            failure_count: Arc::new(AtomicU32::new(0)),
            name,
        }
    }

    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.admit()?;

        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(error) => {
                // Caller mistakes (4xx, validation) say nothing about provider health.
                if error.is_provider_fault() {
                    self.on_failure();
                } else {
                    self.on_success();
                }
                Err(error)
            }
        }
    }

    fn admit(&self) -> Result<()> {
        let opened_at = match *self.state.read() {
            CircuitState::Open { opened_at } => opened_at,
            CircuitState::HalfOpen | CircuitState::Closed => return Ok(()),
        };

        if opened_at.elapsed() < self.recovery_timeout {
            debug!("Circuit breaker '{}' is open, rejecting call", self.name);
            return Err(Error::CircuitBreakerOpen(self.name.clone()));
        }

        *self.state.write() = CircuitState::HalfOpen;
        info!("Circuit breaker '{}' transitioning to half-open", self.name);
        Ok(())
    }

    fn on_success(&self) {
        self.failure_count.store(0, Ordering::SeqCst);

        let mut state = self.state.write();
        if !matches!(*state, CircuitState::Closed) {
            *state = CircuitState::Closed;
            info!("Circuit breaker '{}' recovered, transitioning to closed", self.name);
        }
    }

    fn on_failure(&self) {
        let failure_count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            "Circuit breaker '{}' failure count: {}/{}",
            self.name, failure_count, self.failure_threshold
        );

        let mut state = self.state.write();
        let reopen = matches!(*state, CircuitState::HalfOpen);
        if reopen || failure_count >= self.failure_threshold {
            if !matches!(*state, CircuitState::Open { .. }) {
                warn!(
                    "Circuit breaker '{}' opened after {} consecutive failures",
                    self.name, failure_count
                );
            }
            *state = CircuitState::Open { opened_at: Instant::now() };
        }
    }

    pub fn get_failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.state.read(), CircuitState::Open { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.state.read(), CircuitState::Closed)
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            name: self.name.clone(),
            state: self.state.read().label(),
            failure_count: self.get_failure_count(),
            failure_threshold: self.failure_threshold,
        }
    }
}

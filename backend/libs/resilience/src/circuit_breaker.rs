//! Consecutive-failure circuit breaker
//!
//! Closed until `failure_threshold` calls fail in a row, then Open. Once
//! `timeout` has passed since the last failure the next call is admitted as
//! a probe (HalfOpen); `success_threshold` successful probes close the
//! circuit and a failed probe reopens it.
//!
//! State is per process. The reminder job builds one breaker per run, so a
//! storage outage costs at most `failure_threshold` calls per tick.

use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::metrics::CircuitBreakerMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    /// Calls are rejected without reaching the dependency
    Open,
    /// Probing whether the dependency has recovered
    HalfOpen,
}

impl CircuitState {
    fn label(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    /// Quiet period after the last failure before a probe is admitted
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit open, call rejected")]
    Open,
    #[error("{0}")]
    CallFailed(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitBreakerError::Open)
    }
}

/// A state change to report after the lock is released
struct Transition {
    from: CircuitState,
    to: CircuitState,
    failures: u32,
    open_for: Option<Duration>,
}

#[derive(Debug)]
struct Tally {
    state: CircuitState,
    failures: u32,
    successes: u32,
    last_failure: Option<Instant>,
    opened: Option<Instant>,
}

impl Tally {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            last_failure: None,
            opened: None,
        }
    }

    fn move_to(&mut self, to: CircuitState) -> Transition {
        let from = self.state;
        let open_for = if from == CircuitState::Open {
            self.opened.take().map(|at| at.elapsed())
        } else {
            None
        };
        if to == CircuitState::Open {
            self.opened = Some(Instant::now());
        }
        if to == CircuitState::HalfOpen {
            self.successes = 0;
        }
        self.state = to;
        Transition {
            from,
            to,
            failures: self.failures,
            open_for,
        }
    }

    /// `Err` when the call must be rejected
    fn admit(&mut self, cfg: &CircuitBreakerConfig) -> Result<Option<Transition>, ()> {
        if self.state != CircuitState::Open {
            return Ok(None);
        }
        let quiet = self.last_failure.map_or(Duration::MAX, |at| at.elapsed());
        if quiet < cfg.timeout {
            return Err(());
        }
        Ok(Some(self.move_to(CircuitState::HalfOpen)))
    }

    fn succeeded(&mut self, cfg: &CircuitBreakerConfig) -> Option<Transition> {
        self.failures = 0;
        self.successes = self.successes.saturating_add(1);
        (self.state == CircuitState::HalfOpen && self.successes >= cfg.success_threshold)
            .then(|| self.move_to(CircuitState::Closed))
    }

    fn failed(&mut self, cfg: &CircuitBreakerConfig) -> Option<Transition> {
        self.successes = 0;
        self.failures = self.failures.saturating_add(1);
        self.last_failure = Some(Instant::now());
        let trips = match self.state {
            CircuitState::Closed => self.failures >= cfg.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };
        trips.then(|| self.move_to(CircuitState::Open))
    }
}

/// Cheap to clone; clones share state
#[derive(Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: CircuitBreakerConfig,
    tally: Arc<Mutex<Tally>>,
}

impl CircuitBreaker {
    pub fn new(name: &str, config: CircuitBreakerConfig) -> Self {
        Self {
            name: Arc::from(name),
            config,
            tally: Arc::new(Mutex::new(Tally::closed())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` unless the circuit is open, counting its outcome
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admitted = self.tally.lock().admit(&self.config);
        match admitted {
            Err(()) => {
                CircuitBreakerMetrics::record_call(&self.name, CircuitState::Open.label(), "rejected");
                return Err(CircuitBreakerError::Open);
            }
            Ok(transition) => self.report(transition),
        }

        let outcome = f().await;

        let (state, transition) = {
            let mut tally = self.tally.lock();
            let state = tally.state;
            let transition = match outcome {
                Ok(_) => tally.succeeded(&self.config),
                Err(_) => tally.failed(&self.config),
            };
            (state, transition)
        };
        let result = if outcome.is_ok() { "success" } else { "failure" };
        CircuitBreakerMetrics::record_call(&self.name, state.label(), result);
        self.report(transition);

        outcome.map_err(CircuitBreakerError::CallFailed)
    }

    fn report(&self, transition: Option<Transition>) {
        let Some(t) = transition else { return };

        CircuitBreakerMetrics::record_state_transition(&self.name, t.from.label(), t.to.label());
        if let Some(open_for) = t.open_for {
            CircuitBreakerMetrics::record_open_duration(&self.name, open_for.as_secs_f64());
        }

        if t.to == CircuitState::Open {
            warn!(breaker = %self.name, from = %t.from, failures = t.failures, "circuit opened");
        } else {
            info!(breaker = %self.name, from = %t.from, to = %t.to, "circuit state changed");
        }
    }

    pub fn state(&self) -> CircuitState {
        self.tally.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.tally.lock().failures
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

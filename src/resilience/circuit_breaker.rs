use crate::error::BoxError;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub failure_count: u32,
    pub success_count: u32,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    /// Consecutive half-open successes needed to close again.
    pub half_open_successes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
            half_open_successes: 3,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure threshold
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set how long the circuit stays open before probing
    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_half_open_successes(mut self, successes: u32) -> Self {
        self.half_open_successes = successes;
        self
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

type FailureClassifier = Arc<dyn Fn(&BoxError) -> bool + Send + Sync>;

#[derive(Debug)]
struct State {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
}

/// Three-state circuit breaker.
///
/// - Closed: calls pass, consecutive failures are counted
/// - Open: calls fail fast until `recovery_timeout` has passed since the last failure
/// - HalfOpen: calls pass as trial calls; `half_open_successes` in a row close the
///   circuit, a single failure re-opens it
pub struct CircuitBreaker {
    cfg: CircuitBreakerConfig,
    classifier: Option<FailureClassifier>,
    state: std::sync::Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        Self {
            cfg,
            classifier: None,
            state: std::sync::Mutex::new(State {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
            }),
        }
    }

    /// Only errors matching `classifier` count as failures; others pass through untouched.
    pub fn with_failure_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&BoxError) -> bool + Send + Sync + 'static,
    {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.cfg
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| {
            Error::runtime_with_context(
                "CircuitBreaker poisoned",
                ErrorContext::new().with_source("circuit_breaker"),
            )
        })
    }

    fn open_remaining(&self, st: &State, now: Instant) -> Duration {
        match st.last_failure {
            Some(at) => (at + self.cfg.recovery_timeout()).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    /// Gate a call. Moves Open to HalfOpen once the recovery timeout has elapsed.
    pub fn allow(&self) -> Result<()> {
        let mut st = self.lock()?;
        if st.state == CircuitState::Open {
            let remaining = self.open_remaining(&st, Instant::now());
            if !remaining.is_zero() {
                return Err(Error::CircuitOpen {
                    retry_after: remaining,
                });
            }
            info!(failure_count = st.failure_count, "circuit breaker half-open, probing upstream");
            st.state = CircuitState::HalfOpen;
            st.success_count = 0;
        }
        Ok(())
    }

    pub fn on_success(&self) {
        if let Ok(mut st) = self.state.lock() {
            match st.state {
                CircuitState::Closed => st.failure_count = 0,
                CircuitState::HalfOpen => {
                    st.success_count = st.success_count.saturating_add(1);
                    if st.success_count >= self.cfg.half_open_successes {
                        info!(trial_successes = st.success_count, "circuit breaker closed");
                        st.state = CircuitState::Closed;
                        st.failure_count = 0;
                        st.success_count = 0;
                    }
                }
                CircuitState::Open => {}
            }
        }
    }

    pub fn on_failure(&self) {
        if let Ok(mut st) = self.state.lock() {
            st.failure_count = st.failure_count.saturating_add(1);
            st.last_failure = Some(Instant::now());
            match st.state {
                CircuitState::Closed => {
                    if st.failure_count >= self.cfg.failure_threshold {
                        warn!(
                            failure_count = st.failure_count,
                            recovery_timeout_ms = self.cfg.recovery_timeout_ms,
                            "circuit breaker opened"
                        );
                        st.state = CircuitState::Open;
                    }
                }
                CircuitState::HalfOpen => {
                    warn!("trial call failed, circuit breaker re-opened");
                    st.state = CircuitState::Open;
                    st.success_count = 0;
                }
                CircuitState::Open => {}
            }
        }
    }

    /// Whether `err` should be counted against the circuit.
    pub fn is_failure(&self, err: &BoxError) -> bool {
        self.classifier.as_ref().map(|c| c(err)).unwrap_or(true)
    }

    /// Run `f` under the breaker. Upstream errors come back as [`Error::Upstream`].
    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, BoxError>>,
    {
        self.allow()?;
        match f().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                if self.is_failure(&err) {
                    self.on_failure();
                }
                Err(Error::Upstream(err))
            }
        }
    }

    /// Current state, without triggering the Open to HalfOpen transition.
    pub fn state(&self) -> CircuitState {
        self.state
            .lock()
            .map(|st| st.state)
            .unwrap_or(CircuitState::Open)
    }

    /// Zero the failure and success counters, keeping the state.
    pub fn reset_counters(&self) {
        if let Ok(mut st) = self.state.lock() {
            st.failure_count = 0;
            st.success_count = 0;
        }
    }

    /// Force the circuit closed.
    pub fn reset(&self) {
        if let Ok(mut st) = self.state.lock() {
            st.state = CircuitState::Closed;
            st.failure_count = 0;
            st.success_count = 0;
            st.last_failure = None;
        }
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let now = Instant::now();
        let (state, failure_count, success_count, open_remaining_ms) = match self.state.lock() {
            Ok(st) => {
                let remaining = (st.state == CircuitState::Open)
                    .then(|| self.open_remaining(&st, now))
                    .filter(|d| !d.is_zero())
                    .map(|d| d.as_millis() as u64);
                (st.state, st.failure_count, st.success_count, remaining)
            }
            Err(_) => (CircuitState::Open, 0, 0, None),
        };
        CircuitBreakerSnapshot {
            state,
            failure_threshold: self.cfg.failure_threshold,
            recovery_timeout_ms: self.cfg.recovery_timeout_ms,
            failure_count,
            success_count,
            open_remaining_ms,
        }
    }
}

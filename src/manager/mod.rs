//! # Rate Limit Manager
//!
//! Orchestrates one protected call: circuit gate, admission, upstream invocation,
//! then the fallback chain when any of those refuse or fail.
//!
//! ```rust
//! use rate_shield::{ManagerConfig, Operation, RateLimitManager};
//! use rate_shield::fallback::DefaultValueFallback;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let manager = RateLimitManager::<u32>::new(ManagerConfig::default()).unwrap();
//! manager.add_fallback_strategy(Arc::new(DefaultValueFallback::new(0u32)));
//!
//! let op = Operation::new("quote", || async { Ok::<u32, std::io::Error>(42) });
//! assert_eq!(manager.execute(&op, true).await.unwrap(), 42);
//! assert_eq!(manager.stats().await.counters.allowed_requests, 1);
//! # });
//! ```

pub mod operation;
pub mod stats;

pub use operation::{Operation, OperationResult};
pub use stats::{ManagerStats, StatsSnapshot};

use crate::config::ManagerConfig;
use crate::error::BoxError;
use crate::fallback::{FallbackCause, FallbackChain, FallbackContext, SharedStrategy};
use crate::resilience::{AdmissionControl, CircuitBreaker, CircuitState, RateLimiter};
use crate::{Error, Result};
use stats::AtomicStats;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Shared entry point for protected upstream calls.
///
/// Construct one per upstream and share it (e.g. behind an `Arc`) across tasks.
/// Each component guards its own state, so concurrent callers only contend on
/// the piece of state they touch.
pub struct RateLimitManager<T: Send + Sync + 'static> {
    config: ManagerConfig,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    fallbacks: FallbackChain<T>,
    stats: AtomicStats,
}

impl<T: Send + Sync + 'static> RateLimitManager<T> {
    pub fn new(config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        let mut limiter = RateLimiter::new(&config.rate_limiter);
        if let Some(ms) = config.wait_poll_interval_ms {
            limiter = limiter.with_poll_interval(Duration::from_millis(ms));
        }
        let breaker = CircuitBreaker::new(config.circuit_breaker.clone());
        debug!(
            algorithm = %config.rate_limiter.algorithm,
            failure_threshold = config.circuit_breaker.failure_threshold,
            "rate limit manager created"
        );
        Ok(Self {
            config,
            limiter,
            breaker,
            fallbacks: FallbackChain::new(),
            stats: AtomicStats::default(),
        })
    }

    /// Only upstream errors matching `classifier` trip the circuit.
    pub fn with_failure_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&BoxError) -> bool + Send + Sync + 'static,
    {
        self.breaker = CircuitBreaker::new(self.config.circuit_breaker.clone())
            .with_failure_classifier(classifier);
        self
    }

    /// Replace the configured admission algorithm with a custom one.
    pub fn with_admission(mut self, admission: Box<dyn AdmissionControl>) -> Self {
        let mut limiter = RateLimiter::from_algorithm(admission);
        if let Some(ms) = self.config.wait_poll_interval_ms {
            limiter = limiter.with_poll_interval(Duration::from_millis(ms));
        }
        self.limiter = limiter;
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub async fn execute(&self, operation: &Operation<T>, fallback_enabled: bool) -> Result<T> {
        self.execute_with_cancel(operation, fallback_enabled, &CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute); `cancel` aborts fallback backoff sleeps.
    pub async fn execute_with_cancel(
        &self,
        operation: &Operation<T>,
        fallback_enabled: bool,
        cancel: &CancellationToken,
    ) -> Result<T> {
        self.stats.record_request();

        if let Err(err) = self.breaker.allow() {
            return self.on_circuit_open(err, operation, fallback_enabled, cancel).await;
        }

        if !self.limiter.try_acquire(1).await {
            self.stats.record_blocked();
            if !fallback_enabled {
                let retry_after = self.limiter.time_until_available().await;
                return Err(Error::RateLimitExceeded {
                    algorithm: self.limiter.algorithm().as_str(),
                    retry_after: Some(retry_after),
                });
            }
            return self
                .degrade(operation, FallbackCause::RateLimited, cancel)
                .await;
        }

        match self.breaker.call(|| operation.invoke()).await {
            Ok(value) => {
                self.stats.record_allowed();
                self.limiter.record_success().await;
                self.fallbacks.notify_success(operation, &value).await;
                Ok(value)
            }
            Err(Error::Upstream(err)) => {
                self.limiter.record_failure().await;
                if !fallback_enabled {
                    return Err(Error::Upstream(err));
                }
                let cause = FallbackCause::UpstreamFailed(err.to_string());
                self.degrade(operation, cause, cancel).await
            }
            // Another caller re-opened the circuit between the gate and the call.
            Err(err) => self.on_circuit_open(err, operation, fallback_enabled, cancel).await,
        }
    }

    async fn on_circuit_open(
        &self,
        err: Error,
        operation: &Operation<T>,
        fallback_enabled: bool,
        cancel: &CancellationToken,
    ) -> Result<T> {
        if !fallback_enabled || !err.is_circuit_open() {
            return Err(err);
        }
        self.degrade(operation, FallbackCause::CircuitOpen, cancel)
            .await
    }

    async fn degrade(
        &self,
        operation: &Operation<T>,
        cause: FallbackCause,
        cancel: &CancellationToken,
    ) -> Result<T> {
        self.stats.record_fallback();
        debug!(operation = operation.name(), %cause, "running fallback chain");
        let ctx = FallbackContext {
            operation,
            cause: &cause,
            cancel,
        };
        self.fallbacks.run(&ctx).await
    }

    /// Block until `permits` can be admitted, or `cancel` fires. Consumes the permits.
    pub async fn wait_for_availability(
        &self,
        permits: u32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.limiter.wait_for_availability(permits, cancel).await
    }

    /// Feed upstream quota hints (e.g. from rate-limit response headers) into admission.
    pub async fn update_budget(&self, remaining: Option<u64>, reset_after: Option<Duration>) {
        self.limiter.update_budget(remaining, reset_after).await
    }

    pub fn add_fallback_strategy(&self, strategy: SharedStrategy<T>) {
        self.fallbacks.add(strategy);
    }

    pub fn remove_fallback_strategy(&self, strategy: &SharedStrategy<T>) -> bool {
        self.fallbacks.remove(strategy)
    }

    pub fn remove_fallback_by_name(&self, name: &str) -> bool {
        self.fallbacks.remove_by_name(name)
    }

    pub fn fallback_names(&self) -> Vec<String> {
        self.fallbacks.names()
    }

    /// Request counters only.
    pub fn counters(&self) -> ManagerStats {
        self.stats.to_stats()
    }

    pub async fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            counters: self.stats.to_stats(),
            circuit: self.breaker.snapshot(),
            admission: self.limiter.snapshot().await,
        }
    }

    /// Zero request counters and breaker counters. Breaker state and admission state are kept.
    pub fn reset_stats(&self) {
        self.stats.reset();
        self.breaker.reset_counters();
    }
}

use super::adaptive::{AdaptiveConfig, AdaptiveLimiter};
use super::leaky_bucket::LeakyBucket;
use super::sliding_window::SlidingWindow;
use super::token_bucket::TokenBucket;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Admission algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    TokenBucket,
    LeakyBucket,
    SlidingWindow,
    Adaptive,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenBucket => "token_bucket",
            Self::LeakyBucket => "leaky_bucket",
            Self::SlidingWindow => "sliding_window",
            Self::Adaptive => "adaptive",
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "token" | "token_bucket" | "tokenbucket" => Ok(Self::TokenBucket),
            "leaky" | "leaky_bucket" | "leakybucket" => Ok(Self::LeakyBucket),
            "sliding" | "sliding_window" | "slidingwindow" => Ok(Self::SlidingWindow),
            "adaptive" => Ok(Self::Adaptive),
            _ => Err(Error::configuration_with_context(
                format!("unknown algorithm '{}'", s),
                crate::ErrorContext::new()
                    .with_field_path("algorithm")
                    .with_details("expected token_bucket, leaky_bucket, sliding_window or adaptive"),
            )),
        }
    }
}

/// Point-in-time gauges of an admission algorithm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdmissionSnapshot {
    pub algorithm: Algorithm,
    pub capacity: u64,
    /// Whole permits that could be granted right now.
    pub available: Option<u64>,
    /// Bucket level (leaky bucket) or requests in window (sliding window).
    pub level: Option<f64>,
    /// Refill or leak rate per second.
    pub current_rate: Option<f64>,
    /// Estimated wait until one permit frees up (ms), if currently exhausted.
    pub estimated_wait_ms: Option<u64>,
}

/// Common capability of every admission algorithm: decide whether more calls may
/// proceed right now.
#[async_trait]
pub trait AdmissionControl: Send + Sync {
    fn algorithm(&self) -> Algorithm;

    /// Take `permits` if all of them are available. Never blocks.
    async fn try_acquire(&self, permits: u32) -> bool;

    /// Best-effort estimate of how long until one permit is available.
    async fn time_until_available(&self) -> Duration;

    async fn snapshot(&self) -> AdmissionSnapshot;

    /// Outcome hooks for algorithms that tune themselves. No-op by default.
    async fn record_success(&self) {}

    async fn record_failure(&self) {}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    pub algorithm: Algorithm,
    /// Bucket capacity (token / leaky / adaptive).
    pub capacity: u32,
    /// Refill rate for token buckets, leak rate for the leaky bucket (per second).
    pub refill_rate: f64,
    /// Sliding window length in seconds.
    pub window_size: u64,
    /// Requests admitted per sliding window.
    pub max_requests: u32,
    pub adaptive: AdaptiveConfig,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::TokenBucket,
            capacity: 10,
            refill_rate: 1.0,
            window_size: 60,
            max_requests: 60,
            adaptive: AdaptiveConfig::default(),
        }
    }
}

impl RateLimiterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token_bucket(capacity: u32, refill_rate: f64) -> Self {
        Self {
            algorithm: Algorithm::TokenBucket,
            capacity,
            refill_rate,
            ..Self::default()
        }
    }

    pub fn leaky_bucket(capacity: u32, leak_rate: f64) -> Self {
        Self {
            algorithm: Algorithm::LeakyBucket,
            capacity,
            refill_rate: leak_rate,
            ..Self::default()
        }
    }

    pub fn sliding_window(window: Duration, max_requests: u32) -> Self {
        Self {
            algorithm: Algorithm::SlidingWindow,
            window_size: window.as_secs().max(1),
            max_requests,
            ..Self::default()
        }
    }

    pub fn adaptive(capacity: u32, initial_rate: f64, adaptive: AdaptiveConfig) -> Self {
        Self {
            algorithm: Algorithm::Adaptive,
            capacity,
            refill_rate: initial_rate,
            adaptive,
            ..Self::default()
        }
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_refill_rate(mut self, rate: f64) -> Self {
        self.refill_rate = rate;
        self
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_size)
    }

    /// Instantiate the selected algorithm.
    pub fn build(&self) -> Box<dyn AdmissionControl> {
        match self.algorithm {
            Algorithm::TokenBucket => Box::new(TokenBucket::new(self.capacity, self.refill_rate)),
            Algorithm::LeakyBucket => Box::new(LeakyBucket::new(self.capacity, self.refill_rate)),
            Algorithm::SlidingWindow => {
                Box::new(SlidingWindow::new(self.window(), self.max_requests))
            }
            Algorithm::Adaptive => Box::new(AdaptiveLimiter::new(
                self.capacity,
                self.refill_rate,
                self.adaptive.clone(),
            )),
        }
    }
}

/// Reset delay assumed when the provider reports an exhausted budget without one.
const DEFAULT_BUDGET_RESET: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct Budget {
    /// Last reported remaining budget from provider, decremented on every admission
    remaining: Option<u64>,
    /// When the provider budget is expected to reset
    reset_at: Option<Instant>,
}

impl Budget {
    /// Time until `permits` fit in the reported budget, or `None` if they fit now.
    fn shortfall(&mut self, permits: u64, now: Instant) -> Option<Duration> {
        if self.reset_at.is_some_and(|at| at <= now) {
            self.remaining = None;
            self.reset_at = None;
        }
        let remaining = self.remaining?;
        if remaining >= permits {
            return None;
        }
        let at = *self.reset_at.get_or_insert(now + DEFAULT_BUDGET_RESET);
        Some(at - now)
    }
}

/// Admission facade: one algorithm plus upstream-reported budget hints.
pub struct RateLimiter {
    inner: Box<dyn AdmissionControl>,
    budget: Mutex<Budget>,
    poll_interval: Duration,
}

impl RateLimiter {
    pub fn new(cfg: &RateLimiterConfig) -> Self {
        Self::from_algorithm(cfg.build())
    }

    /// Wrap a custom algorithm.
    pub fn from_algorithm(inner: Box<dyn AdmissionControl>) -> Self {
        Self {
            inner,
            budget: Mutex::new(Budget::default()),
            poll_interval: Duration::from_millis(50),
        }
    }

    /// Upper bound on each sleep in [`wait_for_availability`](Self::wait_for_availability).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.inner.algorithm()
    }

    /// Remaining time of an upstream-imposed block, if any.
    async fn upstream_block(&self) -> Option<Duration> {
        self.budget.lock().await.shortfall(1, Instant::now())
    }

    /// Non-blocking admission check. Upstream budget hints are honoured before the algorithm.
    pub async fn try_acquire(&self, permits: u32) -> bool {
        let mut budget = self.budget.lock().await;
        if let Some(wait) = budget.shortfall(permits as u64, Instant::now()) {
            debug!(wait_ms = wait.as_millis() as u64, "admission denied by upstream budget");
            return false;
        }
        let admitted = self.inner.try_acquire(permits).await;
        if admitted {
            if let Some(rem) = budget.remaining.as_mut() {
                *rem = rem.saturating_sub(permits as u64);
            }
        } else {
            debug!(algorithm = %self.inner.algorithm(), permits, "admission denied");
        }
        admitted
    }

    pub async fn time_until_available(&self) -> Duration {
        let local = self.inner.time_until_available().await;
        match self.upstream_block().await {
            Some(upstream) => upstream.max(local),
            None => local,
        }
    }

    /// Poll admission until `permits` are granted or `cancel` fires.
    ///
    /// Cancellation never consumes capacity. No FIFO ordering among waiters.
    pub async fn wait_for_availability(
        &self,
        permits: u32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if self.try_acquire(permits).await {
                return Ok(());
            }
            let wait = self
                .time_until_available()
                .await
                .min(self.poll_interval)
                .max(Duration::from_millis(1));
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Update limiter state based on external signals (e.g. HTTP rate-limit headers).
    ///
    /// Admission is refused once the reported `remaining` budget is used up, until
    /// `reset_after` elapses (1s when the provider gave no reset) or a new report arrives.
    pub async fn update_budget(&self, remaining: Option<u64>, reset_after: Option<Duration>) {
        let Some(rem) = remaining else {
            return;
        };
        let now = Instant::now();
        let mut b = self.budget.lock().await;
        b.remaining = Some(rem);
        b.reset_at = match rem {
            0 => Some(now + reset_after.unwrap_or(DEFAULT_BUDGET_RESET)),
            _ => reset_after.map(|after| now + after),
        };
    }

    pub async fn record_success(&self) {
        self.inner.record_success().await;
    }

    pub async fn record_failure(&self) {
        self.inner.record_failure().await;
    }

    pub async fn snapshot(&self) -> AdmissionSnapshot {
        let mut snap = self.inner.snapshot().await;
        if let Some(wait) = self.upstream_block().await {
            let upstream_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
            snap.estimated_wait_ms = Some(snap.estimated_wait_ms.unwrap_or(0).max(upstream_ms));
        }
        snap
    }
}

use super::limiter::{AdmissionControl, AdmissionSnapshot, Algorithm};
use super::token_bucket::TokenBucket;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

/// Bounds and tuning knobs for the self-adjusting limiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Lowest refill rate the limiter will back off to (tokens/sec).
    pub min_rate: f64,
    /// Highest refill rate the limiter will relax to (tokens/sec).
    pub max_rate: f64,
    /// Relative step applied on each adjustment, in (0, 1).
    pub adjustment_factor: f64,
    /// Success ratio above which the rate is increased.
    pub success_threshold: f64,
    pub adjustment_interval_ms: u64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            min_rate: 0.1,
            max_rate: 100.0,
            adjustment_factor: 0.1,
            success_threshold: 0.95,
            adjustment_interval_ms: 60_000,
        }
    }
}

impl AdaptiveConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bounds(mut self, min_rate: f64, max_rate: f64) -> Self {
        self.min_rate = min_rate;
        self.max_rate = max_rate;
        self
    }

    pub fn with_adjustment_factor(mut self, factor: f64) -> Self {
        self.adjustment_factor = factor;
        self
    }

    pub fn with_success_threshold(mut self, threshold: f64) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_adjustment_interval(mut self, interval: Duration) -> Self {
        self.adjustment_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn adjustment_interval(&self) -> Duration {
        Duration::from_millis(self.adjustment_interval_ms)
    }
}

#[derive(Debug)]
struct Outcomes {
    total: u64,
    successful: u64,
    last_adjustment: Instant,
}

/// Token bucket whose refill rate follows the observed success ratio.
///
/// Outcomes are reported through [`record_success`](Self::record_success) and
/// [`record_failure`](Self::record_failure). Once per adjustment interval (checked
/// lazily on every call) the rate moves one multiplicative step up when the ratio
/// beats `success_threshold` and one step down otherwise, staying inside
/// `[min_rate, max_rate]`. An interval without outcomes leaves the rate alone.
pub struct AdaptiveLimiter {
    cfg: AdaptiveConfig,
    bucket: TokenBucket,
    outcomes: Mutex<Outcomes>,
}

impl AdaptiveLimiter {
    pub fn new(capacity: u32, initial_rate: f64, cfg: AdaptiveConfig) -> Self {
        let rate = initial_rate.clamp(cfg.min_rate, cfg.max_rate);
        Self {
            bucket: TokenBucket::new(capacity, rate),
            outcomes: Mutex::new(Outcomes {
                total: 0,
                successful: 0,
                last_adjustment: Instant::now(),
            }),
            cfg,
        }
    }

    pub async fn consume(&self, n: u32) -> bool {
        self.maybe_adjust().await;
        self.bucket.consume(n).await
    }

    pub async fn record_success(&self) {
        self.maybe_adjust().await;
        let mut o = self.outcomes.lock().await;
        o.total += 1;
        o.successful += 1;
    }

    pub async fn record_failure(&self) {
        self.maybe_adjust().await;
        self.outcomes.lock().await.total += 1;
    }

    pub async fn current_rate(&self) -> f64 {
        self.bucket.refill_rate().await
    }

    pub async fn tokens_available(&self) -> u64 {
        self.bucket.tokens_available().await
    }

    async fn maybe_adjust(&self) {
        let mut o = self.outcomes.lock().await;
        let now = Instant::now();
        if now.duration_since(o.last_adjustment) < self.cfg.adjustment_interval() {
            return;
        }

        if o.total > 0 {
            let success_rate = o.successful as f64 / o.total as f64;
            let rate = self.bucket.refill_rate().await;
            let new_rate = if success_rate > self.cfg.success_threshold {
                (rate * (1.0 + self.cfg.adjustment_factor)).min(self.cfg.max_rate)
            } else {
                (rate * (1.0 - self.cfg.adjustment_factor)).max(self.cfg.min_rate)
            };
            if new_rate != rate {
                info!(
                    success_rate,
                    old_rate = rate,
                    new_rate,
                    samples = o.total,
                    "adaptive limiter adjusted refill rate"
                );
                self.bucket.set_refill_rate(new_rate).await;
            }
        }

        o.total = 0;
        o.successful = 0;
        o.last_adjustment = now;
    }
}

#[async_trait]
impl AdmissionControl for AdaptiveLimiter {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Adaptive
    }

    async fn try_acquire(&self, permits: u32) -> bool {
        self.consume(permits).await
    }

    async fn time_until_available(&self) -> Duration {
        self.bucket.time_until_available().await
    }

    async fn snapshot(&self) -> AdmissionSnapshot {
        let mut snap = self.bucket.snapshot().await;
        snap.algorithm = Algorithm::Adaptive;
        snap
    }

    async fn record_success(&self) {
        AdaptiveLimiter::record_success(self).await;
    }

    async fn record_failure(&self) {
        AdaptiveLimiter::record_failure(self).await;
    }
}

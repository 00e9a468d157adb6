use super::limiter::{AdmissionControl, AdmissionSnapshot, Algorithm};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct State {
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

/// Token-bucket admission.
///
/// - Starts full
/// - Refills continuously at `refill_rate` tokens/sec, capped at `capacity`
/// - A request for `n` tokens either takes all `n` or nothing
pub struct TokenBucket {
    capacity: u32,
    state: Mutex<State>,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        let state = Mutex::new(State {
            tokens: capacity as f64,
            refill_rate,
            last_refill: Instant::now(),
        });
        Self { capacity, state }
    }

    fn refill_locked(capacity: u32, st: &mut State) {
        let now = Instant::now();
        let elapsed = now.duration_since(st.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            st.tokens = (st.tokens + elapsed * st.refill_rate).min(capacity as f64);
        }
        st.last_refill = now;
    }

    /// Try to take `n` tokens. Never partially consumes.
    pub async fn consume(&self, n: u32) -> bool {
        let mut st = self.state.lock().await;
        Self::refill_locked(self.capacity, &mut st);
        let wanted = n as f64;
        if st.tokens >= wanted {
            st.tokens -= wanted;
            true
        } else {
            false
        }
    }

    /// Whole tokens currently available, after refilling.
    pub async fn tokens_available(&self) -> u64 {
        let mut st = self.state.lock().await;
        Self::refill_locked(self.capacity, &mut st);
        st.tokens.floor() as u64
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub async fn refill_rate(&self) -> f64 {
        self.state.lock().await.refill_rate
    }

    /// Change the refill rate. Tokens accrued so far are credited at the old rate first.
    pub async fn set_refill_rate(&self, rate: f64) {
        let mut st = self.state.lock().await;
        Self::refill_locked(self.capacity, &mut st);
        st.refill_rate = rate;
    }

    async fn wait_estimate(&self) -> Duration {
        let mut st = self.state.lock().await;
        Self::refill_locked(self.capacity, &mut st);
        if st.tokens >= 1.0 {
            Duration::ZERO
        } else if st.refill_rate <= 0.0 {
            Duration::MAX
        } else {
            // tiny rates overflow Duration
            Duration::try_from_secs_f64((1.0 - st.tokens) / st.refill_rate)
                .unwrap_or(Duration::MAX)
        }
    }
}

#[async_trait]
impl AdmissionControl for TokenBucket {
    fn algorithm(&self) -> Algorithm {
        Algorithm::TokenBucket
    }

    async fn try_acquire(&self, permits: u32) -> bool {
        self.consume(permits).await
    }

    async fn time_until_available(&self) -> Duration {
        self.wait_estimate().await
    }

    async fn snapshot(&self) -> AdmissionSnapshot {
        let wait = self.wait_estimate().await;
        let st = self.state.lock().await;
        AdmissionSnapshot {
            algorithm: Algorithm::TokenBucket,
            capacity: self.capacity as u64,
            available: Some(st.tokens.floor() as u64),
            level: None,
            current_rate: Some(st.refill_rate),
            estimated_wait_ms: (!wait.is_zero())
                .then(|| u64::try_from(wait.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

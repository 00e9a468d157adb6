use super::limiter::{AdmissionControl, AdmissionSnapshot, Algorithm};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct State {
    level: f64,
    last_leak: Instant,
}

/// Leaky-bucket admission: each request raises the level by one, the level drains at
/// `leak_rate` units/sec, and nothing is admitted while the bucket is full.
pub struct LeakyBucket {
    capacity: u32,
    leak_rate: f64,
    state: Mutex<State>,
}

impl LeakyBucket {
    pub fn new(capacity: u32, leak_rate: f64) -> Self {
        Self {
            capacity,
            leak_rate,
            state: Mutex::new(State {
                level: 0.0,
                last_leak: Instant::now(),
            }),
        }
    }

    fn leak_locked(&self, st: &mut State) {
        let now = Instant::now();
        let elapsed = now.duration_since(st.last_leak).as_secs_f64();
        st.level = (st.level - elapsed * self.leak_rate).max(0.0);
        st.last_leak = now;
    }

    /// Admit one request.
    pub async fn add_request(&self) -> bool {
        self.add_requests(1).await
    }

    /// Admit `n` requests at once, or none of them.
    pub async fn add_requests(&self, n: u32) -> bool {
        if n == 0 {
            return true;
        }
        let mut st = self.state.lock().await;
        self.leak_locked(&mut st);
        let capacity = self.capacity as f64;
        // the last unit must still find room below capacity
        if st.level + ((n - 1) as f64) < capacity {
            st.level = (st.level + n as f64).min(capacity);
            true
        } else {
            false
        }
    }

    pub async fn level(&self) -> f64 {
        let mut st = self.state.lock().await;
        self.leak_locked(&mut st);
        st.level
    }

    pub async fn time_until_available(&self) -> Duration {
        let mut st = self.state.lock().await;
        self.leak_locked(&mut st);
        if st.level < self.capacity as f64 {
            Duration::ZERO
        } else if self.leak_rate <= 0.0 {
            Duration::MAX
        } else {
            Duration::try_from_secs_f64(1.0 / self.leak_rate).unwrap_or(Duration::MAX)
        }
    }
}

#[async_trait]
impl AdmissionControl for LeakyBucket {
    fn algorithm(&self) -> Algorithm {
        Algorithm::LeakyBucket
    }

    async fn try_acquire(&self, permits: u32) -> bool {
        self.add_requests(permits).await
    }

    async fn time_until_available(&self) -> Duration {
        LeakyBucket::time_until_available(self).await
    }

    async fn snapshot(&self) -> AdmissionSnapshot {
        let wait = LeakyBucket::time_until_available(self).await;
        let level = self.level().await;
        AdmissionSnapshot {
            algorithm: Algorithm::LeakyBucket,
            capacity: self.capacity as u64,
            available: Some((self.capacity as f64 - level).ceil().max(0.0) as u64),
            level: Some(level),
            current_rate: Some(self.leak_rate),
            estimated_wait_ms: (!wait.is_zero())
                .then(|| u64::try_from(wait.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fills_to_capacity() {
        let bucket = LeakyBucket::new(3, 1.0);
        assert!(bucket.add_request().await);
        assert!(bucket.add_request().await);
        assert!(bucket.add_request().await);
        assert!(!bucket.add_request().await);
        assert_eq!(bucket.level().await, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drains_over_time() {
        let bucket = LeakyBucket::new(2, 2.0);
        assert!(bucket.add_request().await);
        assert!(bucket.add_request().await);
        assert!(!bucket.add_request().await);
        assert_eq!(
            bucket.time_until_available().await,
            Duration::from_millis(500)
        );

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(bucket.level().await, 1.0);
        assert!(bucket.add_request().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_level_never_negative() {
        let bucket = LeakyBucket::new(5, 10.0);
        assert!(bucket.add_request().await);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(bucket.level().await, 0.0);
        assert_eq!(bucket.time_until_available().await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_level_clamped_with_fractional_drain() {
        let bucket = LeakyBucket::new(2, 1.0);
        assert!(bucket.add_request().await);
        assert!(bucket.add_request().await);
        tokio::time::advance(Duration::from_millis(300)).await;
        // 1.7 < 2, admitted but clamped to capacity
        assert!(bucket.add_request().await);
        assert_eq!(bucket.level().await, 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_admission_is_all_or_nothing() {
        let bucket = LeakyBucket::new(4, 1.0);
        assert!(bucket.add_requests(3).await);
        assert!(!bucket.add_requests(2).await);
        assert_eq!(bucket.level().await, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tiny_leak_rate_saturates_wait() {
        let bucket = LeakyBucket::new(1, 1.0e-20);
        assert!(bucket.add_request().await);
        assert_eq!(bucket.time_until_available().await, Duration::MAX);
        assert_eq!(bucket.snapshot().await.estimated_wait_ms, Some(u64::MAX));
    }
}

use super::limiter::{AdmissionControl, AdmissionSnapshot, Algorithm};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window log: admits at most `max_requests` within any trailing `window`.
///
/// Eviction is lazy. Timestamps older than the window are dropped on the next call,
/// so an idle limiter keeps at most `max_requests` stale entries around.
pub struct SlidingWindow {
    window: Duration,
    max_requests: u32,
    requests: Mutex<VecDeque<Instant>>,
}

impl SlidingWindow {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            requests: Mutex::new(VecDeque::with_capacity(max_requests as usize)),
        }
    }

    fn evict_locked(&self, requests: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = requests.front() {
            if now.duration_since(oldest) >= self.window {
                requests.pop_front();
            } else {
                break;
            }
        }
    }

    pub async fn add_request(&self) -> bool {
        self.add_requests(1).await
    }

    /// Admit `n` requests at once, or none of them.
    pub async fn add_requests(&self, n: u32) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.lock().await;
        self.evict_locked(&mut requests, now);
        if requests.len() + n as usize <= self.max_requests as usize {
            requests.extend(std::iter::repeat(now).take(n as usize));
            true
        } else {
            false
        }
    }

    pub async fn requests_in_window(&self) -> usize {
        let now = Instant::now();
        let mut requests = self.requests.lock().await;
        self.evict_locked(&mut requests, now);
        requests.len()
    }

    pub async fn time_until_available(&self) -> Duration {
        let now = Instant::now();
        let mut requests = self.requests.lock().await;
        self.evict_locked(&mut requests, now);
        if requests.len() < self.max_requests as usize {
            return Duration::ZERO;
        }
        match requests.front() {
            Some(&oldest) => (oldest + self.window).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }
}

#[async_trait]
impl AdmissionControl for SlidingWindow {
    fn algorithm(&self) -> Algorithm {
        Algorithm::SlidingWindow
    }

    async fn try_acquire(&self, permits: u32) -> bool {
        self.add_requests(permits).await
    }

    async fn time_until_available(&self) -> Duration {
        SlidingWindow::time_until_available(self).await
    }

    async fn snapshot(&self) -> AdmissionSnapshot {
        let wait = SlidingWindow::time_until_available(self).await;
        let used = self.requests_in_window().await as u64;
        AdmissionSnapshot {
            algorithm: Algorithm::SlidingWindow,
            capacity: self.max_requests as u64,
            available: Some((self.max_requests as u64).saturating_sub(used)),
            level: Some(used as f64),
            current_rate: None,
            estimated_wait_ms: (!wait.is_zero()).then(|| wait.as_millis() as u64),
        }
    }
}

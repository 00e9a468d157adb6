use crate::resilience::{AdmissionSnapshot, CircuitBreakerSnapshot};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Request counters. Monotonic until reset as a unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    pub total_requests: u64,
    pub allowed_requests: u64,
    pub blocked_requests: u64,
    pub fallback_requests: u64,
}

impl ManagerStats {
    pub fn block_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.blocked_requests as f64 / self.total_requests as f64
        }
    }
}

/// Counters plus breaker and admission gauges.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    #[serde(flatten)]
    pub counters: ManagerStats,
    pub circuit: CircuitBreakerSnapshot,
    pub admission: AdmissionSnapshot,
}

#[derive(Default)]
pub(crate) struct AtomicStats {
    total: AtomicU64,
    allowed: AtomicU64,
    blocked: AtomicU64,
    fallback: AtomicU64,
}

impl AtomicStats {
    pub(crate) fn record_request(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_allowed(&self) {
        self.allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback(&self) {
        self.fallback.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        for counter in [&self.total, &self.allowed, &self.blocked, &self.fallback] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub(crate) fn to_stats(&self) -> ManagerStats {
        ManagerStats {
            total_requests: self.total.load(Ordering::Relaxed),
            allowed_requests: self.allowed.load(Ordering::Relaxed),
            blocked_requests: self.blocked.load(Ordering::Relaxed),
            fallback_requests: self.fallback.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_reset() {
        let stats = AtomicStats::default();
        stats.record_request();
        stats.record_request();
        stats.record_blocked();
        stats.record_fallback();
        let snap = stats.to_stats();
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.blocked_requests, 1);
        assert_eq!(snap.block_ratio(), 0.5);

        stats.reset();
        assert_eq!(stats.to_stats(), ManagerStats::default());
    }
}

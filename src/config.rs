//! Manager configuration: one flat document covering admission and circuit breaking.
//!
//! ```yaml
//! algorithm: sliding_window
//! window_size: 60
//! max_requests: 5
//! failure_threshold: 3
//! recovery_timeout_ms: 10000
//! ```

use crate::resilience::{Algorithm, CircuitBreakerConfig, RateLimiterConfig};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    #[serde(flatten)]
    pub rate_limiter: RateLimiterConfig,
    #[serde(flatten)]
    pub circuit_breaker: CircuitBreakerConfig,
    /// Upper bound on each sleep while waiting for admission; `None` keeps the limiter default.
    pub wait_poll_interval_ms: Option<u64>,
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&raw),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&raw),
            other => Err(Error::configuration_with_context(
                "unsupported config file extension",
                ErrorContext::new()
                    .with_field_path(path.display().to_string())
                    .with_details(format!("got {:?}, expected json, yaml or yml", other))
                    .with_source("config_loader"),
            )),
        }
    }

    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiterConfig) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_wait_poll_interval(mut self, interval: Duration) -> Self {
        self.wait_poll_interval_ms = Some(interval.as_millis() as u64);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let rl = &self.rate_limiter;
        match rl.algorithm {
            Algorithm::TokenBucket | Algorithm::LeakyBucket | Algorithm::Adaptive => {
                ensure(rl.capacity > 0, "capacity", "must be greater than 0")?;
                ensure(
                    rl.refill_rate.is_finite() && rl.refill_rate > 0.0,
                    "refill_rate",
                    "must be a finite rate greater than 0",
                )?;
            }
            Algorithm::SlidingWindow => {
                ensure(rl.window_size > 0, "window_size", "must be at least 1 second")?;
                ensure(rl.max_requests > 0, "max_requests", "must be greater than 0")?;
            }
        }

        if rl.algorithm == Algorithm::Adaptive {
            let a = &rl.adaptive;
            ensure(
                a.min_rate.is_finite() && a.min_rate > 0.0,
                "adaptive.min_rate",
                "must be a finite rate greater than 0",
            )?;
            ensure(
                a.max_rate.is_finite() && a.max_rate >= a.min_rate,
                "adaptive.max_rate",
                "must be finite and not below min_rate",
            )?;
            ensure(
                a.adjustment_factor > 0.0 && a.adjustment_factor < 1.0,
                "adaptive.adjustment_factor",
                "must be within (0, 1)",
            )?;
            ensure(
                (0.0..=1.0).contains(&a.success_threshold),
                "adaptive.success_threshold",
                "must be within [0, 1]",
            )?;
            ensure(
                a.adjustment_interval_ms > 0,
                "adaptive.adjustment_interval_ms",
                "must be greater than 0",
            )?;
        }

        let cb = &self.circuit_breaker;
        ensure(cb.failure_threshold > 0, "failure_threshold", "must be greater than 0")?;
        ensure(
            cb.half_open_successes > 0,
            "half_open_successes",
            "must be greater than 0",
        )?;
        ensure(
            self.wait_poll_interval_ms != Some(0),
            "wait_poll_interval_ms",
            "must be greater than 0",
        )?;
        Ok(())
    }
}

fn ensure(ok: bool, field: &str, details: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(Error::configuration_with_context(
            format!("invalid value for '{}'", field),
            ErrorContext::new()
                .with_field_path(field)
                .with_details(details)
                .with_source("config_validator"),
        ))
    }
}

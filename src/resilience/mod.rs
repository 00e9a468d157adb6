//! # Resilience Primitives Module
//!
//! Admission control and failure isolation for calls to a rate-limited upstream.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`limiter`] | [`AdmissionControl`] trait, algorithm selection and the [`RateLimiter`] facade |
//! | [`token_bucket`] | Burst-friendly token bucket |
//! | [`leaky_bucket`] | Constant-drain leaky bucket |
//! | [`sliding_window`] | Rolling request log |
//! | [`adaptive`] | Token bucket that retunes its refill rate from call outcomes |
//! | [`circuit_breaker`] | Closed / Open / HalfOpen failure isolation |
//!
//! ## Circuit Breaker
//!
//! ```rust
//! use rate_shield::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::new()
//!     .with_failure_threshold(5)
//!     .with_recovery_timeout(Duration::from_secs(30));
//! let breaker = CircuitBreaker::new(config);
//!
//! if breaker.allow().is_ok() {
//!     // Make API call...
//!     breaker.on_success();
//! }
//! ```
//!
//! ## Rate Limiter
//!
//! ```rust
//! use rate_shield::resilience::{RateLimiter, RateLimiterConfig};
//!
//! # tokio_test::block_on(async {
//! let limiter = RateLimiter::new(&RateLimiterConfig::token_bucket(100, 10.0));
//! if limiter.try_acquire(1).await {
//!     // Proceed with request...
//! }
//! # });
//! ```

pub mod adaptive;
pub mod circuit_breaker;
pub mod leaky_bucket;
pub mod limiter;
pub mod sliding_window;
pub mod token_bucket;

pub use adaptive::{AdaptiveConfig, AdaptiveLimiter};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState};
pub use leaky_bucket::LeakyBucket;
pub use limiter::{AdmissionControl, AdmissionSnapshot, Algorithm, RateLimiter, RateLimiterConfig};
pub use sliding_window::SlidingWindow;
pub use token_bucket::TokenBucket;

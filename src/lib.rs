//! # rate-shield
//!
//! Resilience layer for calling rate-limited upstream APIs.
//!
//! A [`RateLimitManager`] gates every call through a circuit breaker and an admission
//! algorithm, invokes the upstream operation, and falls back to degraded data when
//! the call is denied or fails. Callers get either a usable value (possibly stale)
//! or one typed [`Error`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rate_shield::fallback::{CacheFallback, DefaultValueFallback};
//! use rate_shield::{ManagerConfig, Operation, RateLimitManager};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> rate_shield::Result<()> {
//!     let config = ManagerConfig::from_yaml_str(
//!         "algorithm: token_bucket\ncapacity: 5\nrefill_rate: 1.0\nfailure_threshold: 3\n",
//!     )?;
//!     let manager = RateLimitManager::<f64>::new(config)?;
//!     manager.add_fallback_strategy(Arc::new(CacheFallback::new(Duration::from_secs(300))?));
//!     manager.add_fallback_strategy(Arc::new(DefaultValueFallback::new(0.0)));
//!
//!     let quote = Operation::new("quote", || async { Ok::<f64, std::io::Error>(187.2) })
//!         .with_args(serde_json::json!({ "symbol": "AAPL" }));
//!     let price = manager.execute(&quote, true).await?;
//!     println!("{price}");
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`resilience`] | Admission algorithms and the circuit breaker |
//! | [`fallback`] | Fallback strategies and the ordered chain |
//! | [`cache`] | TTL cache backend and cache keys used by fallbacks |
//! | [`manager`] | Orchestration, protected operations and statistics |
//! | [`config`] | YAML/JSON configuration with validation |
//! | [`error`] | Error taxonomy |

pub mod cache;
pub mod config;
pub mod error;
pub mod fallback;
pub mod manager;
pub mod resilience;

pub use config::ManagerConfig;
pub use error::{BoxError, Error, ErrorContext, FallbackFailure};
pub use manager::{ManagerStats, Operation, RateLimitManager, StatsSnapshot};
pub use tokio_util::sync::CancellationToken;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

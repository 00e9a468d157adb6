//! # Fallback Chain Module
//!
//! Degraded-service strategies tried, in registration order, when a protected call
//! is denied admission, short-circuited by the breaker, or fails upstream.
//!
//! Every strategy speaks the same [`FallbackStrategy`] contract, so the chain never
//! needs to know which concrete strategy it is driving.
//!
//! | Strategy | Behaviour |
//! |----------|-----------|
//! | [`CacheFallback`] | Recent result for the same key, within its TTL |
//! | [`StaleDataFallback`] | Older result with a looser max age |
//! | [`AlternateProviderFallback`] | Substitute callables, first success wins |
//! | [`DefaultValueFallback`] | Fixed configured value |
//! | [`RetryFallback`] | Re-invokes the original operation with exponential backoff |

mod alternate;
mod cache;
mod default;
mod retry;

pub use alternate::AlternateProviderFallback;
pub use cache::{CacheFallback, StaleDataFallback};
pub use default::DefaultValueFallback;
pub use retry::RetryFallback;

use crate::cache::CacheKey;
use crate::error::FallbackFailure;
use crate::manager::Operation;
use crate::{Error, Result};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why the chain is being consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackCause {
    RateLimited,
    CircuitOpen,
    UpstreamFailed(String),
}

impl std::fmt::Display for FallbackCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate limited"),
            Self::CircuitOpen => write!(f, "circuit open"),
            Self::UpstreamFailed(msg) => write!(f, "upstream failed: {}", msg),
        }
    }
}

/// Everything a strategy may look at.
pub struct FallbackContext<'a, T> {
    pub operation: &'a Operation<T>,
    pub cause: &'a FallbackCause,
    pub cancel: &'a CancellationToken,
}

impl<'a, T> FallbackContext<'a, T> {
    pub fn key(&self) -> &CacheKey {
        self.operation.key()
    }
}

/// `Ok(value)` when the strategy produced something, `Err(reason)` when it declined.
pub type FallbackResult<T> = std::result::Result<T, String>;

#[async_trait]
pub trait FallbackStrategy<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    fn name(&self) -> &str;

    async fn execute(&self, ctx: &FallbackContext<'_, T>) -> FallbackResult<T>;

    /// Called after every successful upstream call. Cache-like strategies store the value.
    async fn on_success(&self, _operation: &Operation<T>, _value: &T) {}
}

pub type SharedStrategy<T> = Arc<dyn FallbackStrategy<T>>;

/// Ordered, runtime-mutable list of strategies.
pub struct FallbackChain<T: Send + Sync + 'static> {
    strategies: ArcSwap<Vec<SharedStrategy<T>>>,
}

impl<T: Send + Sync + 'static> Default for FallbackChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn same_strategy<T: Send + Sync + 'static>(a: &SharedStrategy<T>, b: &SharedStrategy<T>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl<T: Send + Sync + 'static> FallbackChain<T> {
    pub fn new() -> Self {
        Self {
            strategies: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn add(&self, strategy: SharedStrategy<T>) {
        self.strategies.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&strategy));
            next
        });
    }

    /// Remove a previously added strategy by identity.
    pub fn remove(&self, strategy: &SharedStrategy<T>) -> bool {
        self.remove_where(|s| same_strategy(s, strategy))
    }

    /// Remove every strategy registered under `name`.
    pub fn remove_by_name(&self, name: &str) -> bool {
        self.remove_where(|s| s.name() == name)
    }

    fn remove_where(&self, pred: impl Fn(&SharedStrategy<T>) -> bool) -> bool {
        let mut removed = false;
        self.strategies.rcu(|current| {
            let next: Vec<_> = current.iter().filter(|s| !pred(s)).cloned().collect();
            removed = next.len() != current.len();
            next
        });
        removed
    }

    pub fn names(&self) -> Vec<String> {
        self.strategies
            .load()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Try each strategy in order, returning the first value produced.
    pub async fn run(&self, ctx: &FallbackContext<'_, T>) -> Result<T> {
        let strategies = self.strategies.load_full();
        let mut failures = Vec::with_capacity(strategies.len());

        for strategy in strategies.iter() {
            if ctx.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match strategy.execute(ctx).await {
                Ok(value) => {
                    debug!(
                        strategy = strategy.name(),
                        operation = ctx.operation.name(),
                        cause = %ctx.cause,
                        "fallback produced a value"
                    );
                    return Ok(value);
                }
                Err(reason) => {
                    debug!(strategy = strategy.name(), %reason, "fallback declined");
                    failures.push(FallbackFailure {
                        strategy: strategy.name().to_string(),
                        reason,
                    });
                }
            }
        }

        if ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        warn!(
            operation = ctx.operation.name(),
            cause = %ctx.cause,
            attempted = failures.len(),
            "all fallbacks failed"
        );
        Err(Error::AllFallbacksFailed { failures })
    }

    /// Let every strategy observe a fresh upstream result.
    pub async fn notify_success(&self, operation: &Operation<T>, value: &T) {
        let strategies = self.strategies.load_full();
        for strategy in strategies.iter() {
            strategy.on_success(operation, value).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Fixed {
        name: &'static str,
        value: Option<u32>,
        calls: AtomicU32,
    }

    impl Fixed {
        fn new(name: &'static str, value: Option<u32>) -> Arc<Self> {
            Arc::new(Self {
                name,
                value,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl FallbackStrategy<u32> for Fixed {
        fn name(&self) -> &str {
            self.name
        }
        async fn execute(&self, _ctx: &FallbackContext<'_, u32>) -> FallbackResult<u32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.value.ok_or_else(|| "nothing".to_string())
        }
    }

    fn op() -> Operation<u32> {
        Operation::new("quote", || async { Err::<u32, BoxError>("down".into()) })
    }

    #[tokio::test]
    async fn test_first_success_wins_in_order() {
        let chain: FallbackChain<u32> = FallbackChain::new();
        let a = Fixed::new("a", None);
        let b = Fixed::new("b", Some(2));
        let c = Fixed::new("c", Some(3));
        chain.add(a.clone());
        chain.add(b.clone());
        chain.add(c.clone());

        let operation = op();
        let cancel = CancellationToken::new();
        let ctx = FallbackContext {
            operation: &operation,
            cause: &FallbackCause::RateLimited,
            cancel: &cancel,
        };
        assert_eq!(chain.run(&ctx).await.unwrap(), 2);
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
        assert_eq!(c.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_chain_fails() {
        let chain: FallbackChain<u32> = FallbackChain::new();
        let operation = op();
        let cancel = CancellationToken::new();
        let ctx = FallbackContext {
            operation: &operation,
            cause: &FallbackCause::CircuitOpen,
            cancel: &cancel,
        };
        let err = chain.run(&ctx).await.unwrap_err();
        assert_eq!(err.fallback_failures().map(|f| f.len()), Some(0));
    }

    #[tokio::test]
    async fn test_all_declined_collects_reasons() {
        let chain: FallbackChain<u32> = FallbackChain::new();
        chain.add(Fixed::new("a", None));
        chain.add(Fixed::new("b", None));
        let operation = op();
        let cancel = CancellationToken::new();
        let ctx = FallbackContext {
            operation: &operation,
            cause: &FallbackCause::UpstreamFailed("down".into()),
            cancel: &cancel,
        };
        let err = chain.run(&ctx).await.unwrap_err();
        let names: Vec<_> = err
            .fallback_failures()
            .unwrap()
            .iter()
            .map(|f| f.strategy.as_str())
            .collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn test_add_and_remove() {
        let chain: FallbackChain<u32> = FallbackChain::new();
        let a: SharedStrategy<u32> = Fixed::new("a", None);
        let b: SharedStrategy<u32> = Fixed::new("b", None);
        chain.add(a.clone());
        chain.add(b.clone());
        assert_eq!(chain.names(), ["a", "b"]);

        assert!(chain.remove(&a));
        assert!(!chain.remove(&a));
        assert_eq!(chain.names(), ["b"]);

        assert!(chain.remove_by_name("b"));
        assert!(chain.is_empty());
    }
}

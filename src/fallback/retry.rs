use super::{FallbackCause, FallbackContext, FallbackResult, FallbackStrategy};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Re-invokes a failed operation up to `max_retries` times, sleeping
/// `base_delay * 2^attempt` (capped at `max_delay`) before each attempt.
///
/// Only upstream failures are retried. Calls refused by admission or by an open
/// circuit never reached the upstream, and retrying them would bypass both gates.
/// Backoff sleeps abort on cancellation.
pub struct RetryFallback {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryFallback {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(60),
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let cap = self.max_delay.as_millis() as u64;

        // Exponential backoff: base * 2^attempt
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(base.saturating_mul(factor).min(cap))
    }
}

#[async_trait]
impl<T> FallbackStrategy<T> for RetryFallback
where
    T: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "retry"
    }

    async fn execute(&self, ctx: &FallbackContext<'_, T>) -> FallbackResult<T> {
        if !matches!(ctx.cause, FallbackCause::UpstreamFailed(_)) {
            return Err(format!("{}, not retrying", ctx.cause));
        }

        let mut last_error = None;
        for attempt in 0..self.max_retries {
            let delay = self.backoff(attempt);
            tokio::select! {
                _ = ctx.cancel.cancelled() => return Err("cancelled during backoff".to_string()),
                _ = tokio::time::sleep(delay) => {}
            }
            match ctx.operation.invoke().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!(
                        operation = ctx.operation.name(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retry attempt failed"
                    );
                    last_error = Some(e.to_string());
                }
            }
        }
        Err(match last_error {
            Some(e) => format!("{} attempts failed, last error: {}", self.max_retries, e),
            None => "retries disabled".to_string(),
        })
    }
}

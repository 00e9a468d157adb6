use super::{FallbackContext, FallbackResult, FallbackStrategy};
use crate::manager::Operation;
use async_trait::async_trait;
use tracing::debug;

/// Substitute implementations of the same call, e.g. a secondary market-data vendor.
pub struct AlternateProviderFallback<T> {
    providers: Vec<Operation<T>>,
}

impl<T> AlternateProviderFallback<T> {
    pub fn new(providers: Vec<Operation<T>>) -> Self {
        Self { providers }
    }

    pub fn with_provider(mut self, provider: Operation<T>) -> Self {
        self.providers.push(provider);
        self
    }
}

#[async_trait]
impl<T> FallbackStrategy<T> for AlternateProviderFallback<T>
where
    T: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "alternate_provider"
    }

    async fn execute(&self, ctx: &FallbackContext<'_, T>) -> FallbackResult<T> {
        if self.providers.is_empty() {
            return Err("no alternate providers configured".to_string());
        }
        let mut errors = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            if ctx.cancel.is_cancelled() {
                return Err("cancelled".to_string());
            }
            match provider.invoke().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!(provider = provider.name(), error = %e, "alternate provider failed");
                    errors.push(format!("{}: {}", provider.name(), e));
                }
            }
        }
        Err(errors.join(", "))
    }
}

use super::{FallbackContext, FallbackResult, FallbackStrategy};
use crate::cache::{CacheBackend, CacheKey, MemoryCache};
use crate::manager::Operation;
use crate::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_MAX_ENTRIES: usize = 1024;

/// Serialized view over a backend with a fixed entry lifetime.
struct Store {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl Store {
    async fn load<T: DeserializeOwned>(&self, key: &CacheKey) -> FallbackResult<T> {
        match self.backend.get(key).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes)
                .map_err(|e| format!("corrupt entry for {}: {}", key, e)),
            Ok(None) => Err("no entry".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn save<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.backend.set(key, &bytes, self.ttl).await
    }

    async fn clear(&self) -> Result<()> {
        self.backend.clear().await
    }
}

/// Serves the last good result for the same key while it is younger than `ttl`.
pub struct CacheFallback {
    store: Store,
}

impl CacheFallback {
    pub fn new(ttl: Duration) -> Result<Self> {
        Ok(Self::with_backend(Arc::new(MemoryCache::new(DEFAULT_MAX_ENTRIES)?), ttl))
    }

    pub fn with_backend(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            store: Store { backend, ttl },
        }
    }

    /// Pre-populate or overwrite the entry for `key`.
    pub async fn store<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<()> {
        self.store.save(key, value).await
    }

    pub async fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        self.store.backend.delete(key).await
    }

    /// Drop every cached result, e.g. after the upstream changed its data.
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }

    /// Number of results that can still be served.
    pub async fn entry_count(&self) -> Result<usize> {
        self.store.backend.entry_count().await
    }
}

#[async_trait]
impl<T> FallbackStrategy<T> for CacheFallback
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "cache"
    }

    async fn execute(&self, ctx: &FallbackContext<'_, T>) -> FallbackResult<T> {
        self.store.load(ctx.key()).await
    }

    async fn on_success(&self, operation: &Operation<T>, value: &T) {
        if let Err(e) = self.store.save(operation.key(), value).await {
            debug!(operation = operation.name(), error = %e, "cache write skipped");
        }
    }
}

/// Like [`CacheFallback`] but with a much longer `max_age`: data that is better than nothing.
pub struct StaleDataFallback {
    store: Store,
}

impl StaleDataFallback {
    pub fn new(max_age: Duration) -> Result<Self> {
        Ok(Self::with_backend(Arc::new(MemoryCache::new(DEFAULT_MAX_ENTRIES)?), max_age))
    }

    pub fn with_backend(backend: Arc<dyn CacheBackend>, max_age: Duration) -> Self {
        Self {
            store: Store {
                backend,
                ttl: max_age,
            },
        }
    }

    pub async fn store<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<()> {
        self.store.save(key, value).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }
}

#[async_trait]
impl<T> FallbackStrategy<T> for StaleDataFallback
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "stale_data"
    }

    async fn execute(&self, ctx: &FallbackContext<'_, T>) -> FallbackResult<T> {
        let value = self.store.load(ctx.key()).await?;
        warn!(operation = ctx.operation.name(), cause = %ctx.cause, "serving stale data");
        Ok(value)
    }

    async fn on_success(&self, operation: &Operation<T>, value: &T) {
        if let Err(e) = self.store.save(operation.key(), value).await {
            debug!(operation = operation.name(), error = %e, "stale-data write skipped");
        }
    }
}

//! Cache backend implementations.

use super::key::CacheKey;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Clone)]
struct CacheEntry {
    data: Vec<u8>,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data,
            stored_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &CacheKey) -> Result<bool>;
    async fn clear(&self) -> Result<()>;
    /// Number of live (unexpired) entries.
    async fn entry_count(&self) -> Result<usize>;
}

/// Bounded in-memory store: least recently used entries go first, expired entries
/// read as absent and are dropped on access.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Result<Self> {
        let cap = NonZeroUsize::new(max_entries).ok_or_else(|| {
            Error::configuration_with_context(
                "cache size must be non-zero",
                ErrorContext::new()
                    .with_field_path("max_entries")
                    .with_source("memory_cache"),
            )
        })?;
        Ok(Self {
            entries: Mutex::new(LruCache::new(cap)),
        })
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(&key.hash) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.data.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(&key.hash);
        }
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.put(key.hash.clone(), CacheEntry::new(value.to_vec(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entries.lock().await.pop(&key.hash).is_some())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.lock().await.clear();
        Ok(())
    }

    async fn entry_count(&self) -> Result<usize> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .filter(|(_, e)| !e.is_expired())
            .count())
    }}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> CacheKey {
        CacheKey::new(s)
    }

    #[tokio::test(start_paused = true)]
    async fn test_roundtrip_and_expiry() {
        let cache = MemoryCache::new(8).unwrap();
        let key = key("k");
        cache.set(&key, b"42", Duration::from_secs(5)).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(b"42".to_vec()));
        assert_eq!(cache.entry_count().await.unwrap(), 1);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.entry_count().await.unwrap(), 0);
        assert_eq!(cache.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_evicts_least_recently_used() {
        let cache = MemoryCache::new(2).unwrap();
        let ttl = Duration::from_secs(60);
        cache.set(&key("a"), b"1", ttl).await.unwrap();
        cache.set(&key("b"), b"2", ttl).await.unwrap();
        cache.get(&key("a")).await.unwrap();
        cache.set(&key("c"), b"3", ttl).await.unwrap();

        assert!(cache.get(&key("a")).await.unwrap().is_some());
        assert!(cache.get(&key("b")).await.unwrap().is_none());
        assert!(cache.get(&key("c")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let cache = MemoryCache::new(4).unwrap();
        let ttl = Duration::from_secs(60);
        cache.set(&key("a"), b"1", ttl).await.unwrap();
        cache.set(&key("b"), b"2", ttl).await.unwrap();
        assert!(cache.delete(&key("a")).await.unwrap());
        assert!(!cache.delete(&key("a")).await.unwrap());
        assert_eq!(cache.entry_count().await.unwrap(), 1);
        cache.clear().await.unwrap();
        assert_eq!(cache.entry_count().await.unwrap(), 0);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(MemoryCache::new(0).is_err());
    }
}

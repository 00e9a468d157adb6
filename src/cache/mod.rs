//! # Response Cache Module
//!
//! In-memory, TTL-bounded storage for upstream results, used by the cache-backed
//! fallback strategies to serve fresh or stale data when the upstream is
//! throttled or failing.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheBackend`] | Trait for implementing custom cache backends |
//! | [`MemoryCache`] | Bounded in-memory LRU store with per-entry TTL |
//! | [`CacheKey`] | Identity of one protected call |
//! | [`CacheKeyGenerator`] | Derives keys from operation name + arguments |
//!
//! Keys hash the operation name together with its canonicalised JSON arguments,
//! so `quote(AAPL)` and `quote(MSFT)` never share an entry.

mod backend;
mod key;

pub use backend::{CacheBackend, MemoryCache};
pub use key::{CacheKey, CacheKeyGenerator};

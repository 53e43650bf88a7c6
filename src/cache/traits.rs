//! Cache store trait and error types
//!
//! Every backend implements [`CacheStore`]. All operations take `&self` and
//! synchronise internally, so a store can be shared across workers behind an
//! `Arc<dyn CacheStore>`.

use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during cache operations
///
/// The pipeline treats any cache error as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("{backend} cache unavailable: {message}")]
    Unavailable {
        backend: &'static str,
        message: String,
    },
}

impl CacheError {
    pub fn unavailable(backend: &'static str, cause: impl Display) -> Self {
        Self::Unavailable {
            backend,
            message: cause.to_string(),
        }
    }
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Point-in-time counters of a cache store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Lock-free counters shared by the backends
#[derive(Debug, Default)]
pub(crate) struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl Counters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn evicted(&self, n: u64) {
        self.evictions.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn expired(&self, n: u64) {
        self.expirations.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entries: usize) -> CacheStats {
        CacheStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

/// Trait for cache backend implementations
///
/// # Guarantees
///
/// - `get` after a returned `set` on the same key observes the stored value
///   until it expires or is evicted
/// - once the entry count exceeds the configured maximum, the least recently
///   used entry (by last `get` or `set`) is evicted first
/// - expiry is checked lazily on `get`; `sweep_expired` removes the rest
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short backend identifier for logs and stats
    fn backend_name(&self) -> &'static str;

    /// Looks up a live entry, refreshing its recency
    async fn get(&self, key: &Fingerprint) -> CacheResult<Option<Vec<u8>>>;

    /// Stores `value` under `key` for `ttl`, replacing any previous value
    async fn set(&self, key: &Fingerprint, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    /// Removes an entry; returns whether it existed
    async fn delete(&self, key: &Fingerprint) -> CacheResult<bool>;

    /// Removes every entry
    async fn clear(&self) -> CacheResult<()>;

    /// Removes all expired entries and returns how many were dropped
    async fn sweep_expired(&self) -> CacheResult<usize>;

    async fn stats(&self) -> CacheResult<CacheStats>;
}

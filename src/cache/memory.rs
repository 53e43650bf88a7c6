//! In-process LRU cache backend

use crate::cache::entry::CacheEntry;
use crate::cache::traits::{CacheError, CacheResult, CacheStats, CacheStore, Counters};
use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use chrono::Utc;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const BACKEND: &str = "memory";

/// In-memory cache bounded by entry count
pub struct MemoryCache {
    entries: Mutex<LruCache<Fingerprint, CacheEntry>>,
    counters: Counters,
}

impl MemoryCache {
    /// Creates a cache holding at most `max_entries` entries (minimum 1)
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            counters: Counters::default(),
        }
    }

    fn lock(&self) -> CacheResult<MutexGuard<'_, LruCache<Fingerprint, CacheEntry>>> {
        self.entries
            .lock()
            .map_err(|_| CacheError::unavailable(BACKEND, "cache lock poisoned"))
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    async fn get(&self, key: &Fingerprint) -> CacheResult<Option<Vec<u8>>> {
        let mut entries = self.lock()?;

        let expired = match entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.hits += 1;
                self.counters.hit();
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
            self.counters.expired(1);
        }
        self.counters.miss();
        Ok(None)
    }

    async fn set(&self, key: &Fingerprint, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let mut entries = self.lock()?;
        if let Some((evicted, _)) = entries.push(key.clone(), CacheEntry::new(value, ttl)) {
            // push hands back the old value when the key was already present
            if evicted != *key {
                tracing::trace!("Evicted least recently used entry {}", evicted);
                self.counters.evicted(1);
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &Fingerprint) -> CacheResult<bool> {
        Ok(self.lock()?.pop(key).is_some())
    }

    async fn clear(&self) -> CacheResult<()> {
        self.lock()?.clear();
        Ok(())
    }

    async fn sweep_expired(&self) -> CacheResult<usize> {
        let mut entries = self.lock()?;
        let now = Utc::now();

        let expired: Vec<Fingerprint> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }
        self.counters.expired(expired.len() as u64);
        Ok(expired.len())
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        let len = self.lock()?.len();
        Ok(self.counters.snapshot(len))
    }
}

//! On-disk cache backend
//!
//! One file per fingerprint (`<fingerprint>.entry`) inside a cache directory.
//! Each file starts with a one-line JSON header carrying the timestamps,
//! followed by the raw payload. Writes go through a temporary file and a
//! rename, so readers never see a partial entry.
//!
//! Every operation on an entry holds that entry's key lock from the first
//! read to the last write, so a `get` that finds an expired file can never
//! delete a fresh one renamed into place by a concurrent `set`.
//!
//! Recency is tracked in memory and rebuilt from file modification times
//! when the directory is opened.

use crate::cache::entry::expiry_after;
use crate::cache::key_lock::KeyLocks;
use crate::cache::traits::{CacheError, CacheResult, CacheStats, CacheStore, Counters};
use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

const BACKEND: &str = "file";
const ENTRY_EXTENSION: &str = "entry";
const TMP_MARKER: &str = ".tmp-";

#[derive(Debug, Serialize, Deserialize)]
struct FileHeader {
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Directory-backed cache bounded by entry count
pub struct FileCache {
    dir: PathBuf,
    max_entries: usize,
    /// Recency order of the entries on disk, with per-entry hit counts
    index: Mutex<LruCache<Fingerprint, u64>>,
    locks: KeyLocks,
    counters: Counters,
}

impl FileCache {
    /// Opens (creating if needed) a cache directory and indexes its entries
    ///
    /// Temporary files left behind by an interrupted write are removed.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Unavailable` if the directory cannot be created
    /// or listed.
    pub async fn open(dir: impl AsRef<Path>, max_entries: usize) -> CacheResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| unavailable(&dir, e))?;

        let mut found: Vec<(SystemTime, Fingerprint)> = Vec::new();
        let mut listing = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| unavailable(&dir, e))?;

        while let Some(item) = listing
            .next_entry()
            .await
            .map_err(|e| unavailable(&dir, e))?
        {
            let path = item.path();
            if is_tmp_file(&path) {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    tracing::warn!("Failed to remove stale {}: {}", path.display(), e);
                }
                continue;
            }

            let Some(key) = key_from_path(&path) else {
                continue;
            };
            let modified = item
                .metadata()
                .await
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((modified, key));
        }

        // Oldest first, so the most recently written entry ends up most recent
        found.sort();
        let mut index = LruCache::unbounded();
        for (_, key) in found {
            index.put(key, 0);
        }

        tracing::debug!(
            "Opened file cache at {} with {} entries",
            dir.display(),
            index.len()
        );

        let cache = Self {
            dir,
            max_entries: max_entries.max(1),
            index: Mutex::new(index),
            locks: KeyLocks::default(),
            counters: Counters::default(),
        };
        cache.enforce_capacity().await?;
        Ok(cache)
    }

    fn entry_path(&self, key: &Fingerprint) -> PathBuf {
        self.dir
            .join(format!("{}.{}", key.as_str(), ENTRY_EXTENSION))
    }

    fn lock(&self) -> CacheResult<MutexGuard<'_, LruCache<Fingerprint, u64>>> {
        self.index
            .lock()
            .map_err(|_| CacheError::unavailable(BACKEND, "index lock poisoned"))
    }

    /// Reads and decodes an entry file; `None` if it does not exist
    ///
    /// Caller must hold the key lock.
    async fn read_entry(&self, key: &Fingerprint) -> CacheResult<Option<(FileHeader, Vec<u8>)>> {
        let path = self.entry_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(unavailable(&path, e)),
        };

        match decode_entry(&bytes) {
            Some(decoded) => Ok(Some(decoded)),
            None => {
                tracing::warn!("Discarding corrupt cache file {}", path.display());
                self.remove_file(key).await?;
                Ok(None)
            }
        }
    }

    /// Caller must hold the key lock
    async fn remove_file(&self, key: &Fingerprint) -> CacheResult<bool> {
        let path = self.entry_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(unavailable(&path, e)),
        }
    }

    /// Removes the file of a key dropped from the index
    ///
    /// Skipped if a concurrent `set` or `get` indexed the key again before
    /// the lock was taken.
    async fn remove_unindexed(&self, key: &Fingerprint) -> CacheResult<bool> {
        let _guard = self.locks.lock(key).await;
        if self.lock()?.contains(key) {
            return Ok(false);
        }
        self.remove_file(key).await
    }

    /// Evicts least recently used entries until the index fits
    async fn enforce_capacity(&self) -> CacheResult<()> {
        let victims: Vec<Fingerprint> = {
            let mut index = self.lock()?;
            let mut victims = Vec::new();
            while index.len() > self.max_entries {
                match index.pop_lru() {
                    Some((key, _)) => victims.push(key),
                    None => break,
                }
            }
            victims
        };

        let mut evicted = 0;
        for key in &victims {
            if self.remove_unindexed(key).await? {
                tracing::trace!("Evicted least recently used entry {}", key);
                evicted += 1;
            }
        }
        self.counters.evicted(evicted);
        Ok(())
    }

    async fn write_entry(&self, key: &Fingerprint, bytes: &[u8]) -> CacheResult<()> {
        let path = self.entry_path(key);
        let tmp = self.dir.join(format!(
            "{}{}{:016x}",
            key.as_str(),
            TMP_MARKER,
            rand::random::<u64>()
        ));

        if let Err(e) = tokio::fs::write(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(unavailable(&tmp, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(unavailable(&path, e));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FileCache {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    async fn get(&self, key: &Fingerprint) -> CacheResult<Option<Vec<u8>>> {
        let _guard = self.locks.lock(key).await;

        let Some((header, payload)) = self.read_entry(key).await? else {
            self.lock()?.pop(key);
            self.counters.miss();
            return Ok(None);
        };

        if Utc::now() >= header.expires_at {
            self.lock()?.pop(key);
            self.remove_file(key).await?;
            self.counters.expired(1);
            self.counters.miss();
            return Ok(None);
        }

        {
            let mut index = self.lock()?;
            match index.get_mut(key) {
                Some(hits) => *hits += 1,
                None => {
                    index.put(key.clone(), 1);
                }
            }
        }
        self.counters.hit();
        Ok(Some(payload))
    }

    async fn set(&self, key: &Fingerprint, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let created_at = Utc::now();
        let header = FileHeader {
            created_at,
            expires_at: expiry_after(created_at, ttl),
        };
        let mut bytes = serde_json::to_vec(&header).map_err(|e| CacheError::unavailable(BACKEND, e))?;
        bytes.push(b'\n');
        bytes.extend_from_slice(&value);

        {
            let _guard = self.locks.lock(key).await;
            self.write_entry(key, &bytes).await?;
            self.lock()?.put(key.clone(), 0);
        }

        // Outside the key lock: eviction takes the victims' locks one by one
        self.enforce_capacity().await
    }

    async fn delete(&self, key: &Fingerprint) -> CacheResult<bool> {
        let _guard = self.locks.lock(key).await;
        self.lock()?.pop(key);
        self.remove_file(key).await
    }

    async fn clear(&self) -> CacheResult<()> {
        let keys: Vec<Fingerprint> = {
            let mut index = self.lock()?;
            let keys = index.iter().map(|(key, _)| key.clone()).collect();
            index.clear();
            keys
        };

        for key in &keys {
            self.remove_unindexed(key).await?;
        }
        Ok(())
    }

    async fn sweep_expired(&self) -> CacheResult<usize> {
        let keys: Vec<Fingerprint> = self.lock()?.iter().map(|(key, _)| key.clone()).collect();
        let mut removed = 0;

        for key in keys {
            let _guard = self.locks.lock(&key).await;
            let expired = match self.read_entry(&key).await? {
                Some((header, _)) => Utc::now() >= header.expires_at,
                None => false,
            };
            if expired {
                self.lock()?.pop(&key);
                self.remove_file(&key).await?;
                removed += 1;
            }
        }

        self.counters.expired(removed as u64);
        Ok(removed)
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        let len = self.lock()?.len();
        Ok(self.counters.snapshot(len))
    }
}

fn key_from_path(path: &Path) -> Option<Fingerprint> {
    if path.extension()?.to_str()? != ENTRY_EXTENSION {
        return None;
    }
    Fingerprint::from_hex(path.file_stem()?.to_str()?)
}

fn is_tmp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map_or(false, |name| name.contains(TMP_MARKER))
}

fn decode_entry(bytes: &[u8]) -> Option<(FileHeader, Vec<u8>)> {
    let split = bytes.iter().position(|b| *b == b'\n')?;
    let header: FileHeader = serde_json::from_slice(&bytes[..split]).ok()?;
    Some((header, bytes[split + 1..].to_vec()))
}

fn unavailable(path: &Path, err: std::io::Error) -> CacheError {
    CacheError::unavailable(BACKEND, format!("{}: {}", path.display(), err))
}

//! Cache store abstraction and backends
//!
//! Stage results are cached under their [`Fingerprint`](crate::Fingerprint).
//! The cache is an optimization only: the pipeline treats any
//! [`CacheError`] as a miss.

mod entry;
mod file;
mod key_lock;
mod memory;
mod sqlite;
mod traits;

pub use entry::CacheEntry;
pub use file::FileCache;
pub use key_lock::{KeyGuard, KeyLocks};
pub use memory::MemoryCache;
pub use sqlite::{initialize_schema, SqliteCache};
pub use traits::{CacheError, CacheResult, CacheStats, CacheStore};

use crate::config::{CacheBackend, CacheConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Opens the backend selected by `config`
///
/// # Errors
///
/// Returns `CacheError::Unavailable` if the backend cannot be opened. This is
/// a batch-level failure and happens before any job is scheduled.
pub async fn open_cache(config: &CacheConfig) -> CacheResult<Arc<dyn CacheStore>> {
    let store: Arc<dyn CacheStore> = match config.backend {
        CacheBackend::Memory => Arc::new(MemoryCache::new(config.max_entries)),
        CacheBackend::File => {
            let dir = backend_path(config)?;
            Arc::new(FileCache::open(dir, config.max_entries).await?)
        }
        CacheBackend::Sqlite => {
            let path = backend_path(config)?;
            Arc::new(SqliteCache::open(&path, config.max_entries)?)
        }
    };

    tracing::info!(
        "Using {} cache (ttl {}s, max {} entries)",
        store.backend_name(),
        config.ttl_secs,
        config.max_entries
    );
    Ok(store)
}

fn backend_path(config: &CacheConfig) -> CacheResult<PathBuf> {
    config
        .path
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| CacheError::unavailable(config.backend.as_str(), "no cache path configured"))
}

/// Periodically removes expired entries until `shutdown` is cancelled
pub fn spawn_sweeper(
    store: Arc<dyn CacheStore>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match store.sweep_expired().await {
                        Ok(0) => {}
                        Ok(n) => tracing::debug!("Swept {} expired cache entries", n),
                        Err(e) => tracing::warn!("Cache sweep failed: {}", e),
                    }
                }
            }
        }
    })
}

//! SQLite cache backend
//!
//! Stands in for a shared cache service: several pipeline processes can point
//! at the same database file. All statements run on the blocking thread pool
//! so workers never stall the async runtime on disk I/O.

use crate::cache::entry::expiry_after;
use crate::cache::traits::{CacheError, CacheResult, CacheStats, CacheStore, Counters};
use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BACKEND: &str = "sqlite";

/// SQL schema for the cache database
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    access_seq INTEGER NOT NULL,
    hits INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_access ON cache_entries(access_seq);
CREATE INDEX IF NOT EXISTS idx_cache_entries_expires ON cache_entries(expires_at);
"#;

/// Initializes the cache schema
///
/// Safe to call on an existing database.
pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}

/// SQLite-backed cache bounded by entry count
pub struct SqliteCache {
    conn: Arc<Mutex<Connection>>,
    max_entries: usize,
    /// Monotonic recency counter; the lowest `access_seq` is evicted first
    access_seq: Arc<AtomicU64>,
    counters: Counters,
}

impl SqliteCache {
    /// Opens or creates a cache database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `max_entries` - Maximum number of entries kept before LRU eviction
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteCache)` - Successfully opened/created database
    /// * `Err(CacheError)` - Failed to open or initialize the database
    pub fn open(path: &Path, max_entries: usize) -> CacheResult<Self> {
        let conn = Connection::open(path).map_err(unavailable)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
        ",
        )
        .map_err(unavailable)?;

        Self::from_connection(conn, max_entries)
    }

    /// Creates an in-memory database
    pub fn open_in_memory(max_entries: usize) -> CacheResult<Self> {
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        Self::from_connection(conn, max_entries)
    }

    fn from_connection(conn: Connection, max_entries: usize) -> CacheResult<Self> {
        initialize_schema(&conn).map_err(unavailable)?;

        let last_seq: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(access_seq), 0) FROM cache_entries",
                [],
                |row| row.get(0),
            )
            .map_err(unavailable)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_entries: max_entries.max(1),
            access_seq: Arc::new(AtomicU64::new(last_seq.max(0) as u64)),
            counters: Counters::default(),
        })
    }

    /// Runs `f` against the connection on the blocking thread pool
    async fn with_conn<T, F>(&self, f: F) -> CacheResult<T>
    where
        F: FnOnce(&Connection, &AtomicU64) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let seq = Arc::clone(&self.access_seq);

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| CacheError::unavailable(BACKEND, "connection lock poisoned"))?;
            f(&conn, &seq).map_err(unavailable)
        })
        .await
        .map_err(|e| CacheError::unavailable(BACKEND, e))?
    }
}

enum Lookup {
    Hit(Vec<u8>),
    Expired,
    Missing,
}

#[async_trait]
impl CacheStore for SqliteCache {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    async fn get(&self, key: &Fingerprint) -> CacheResult<Option<Vec<u8>>> {
        let key = key.as_str().to_string();
        let now = Utc::now().timestamp_millis();

        let lookup = self
            .with_conn(move |conn, seq| {
                let row: Option<(Vec<u8>, i64)> = conn
                    .query_row(
                        "SELECT value, expires_at FROM cache_entries WHERE key = ?1",
                        params![key],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                match row {
                    None => Ok(Lookup::Missing),
                    Some((_, expires_at)) if now >= expires_at => {
                        conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
                        Ok(Lookup::Expired)
                    }
                    Some((value, _)) => {
                        let next = seq.fetch_add(1, Ordering::SeqCst) + 1;
                        conn.execute(
                            "UPDATE cache_entries SET access_seq = ?1, hits = hits + 1 WHERE key = ?2",
                            params![next as i64, key],
                        )?;
                        Ok(Lookup::Hit(value))
                    }
                }
            })
            .await?;

        match lookup {
            Lookup::Hit(value) => {
                self.counters.hit();
                Ok(Some(value))
            }
            Lookup::Expired => {
                self.counters.expired(1);
                self.counters.miss();
                Ok(None)
            }
            Lookup::Missing => {
                self.counters.miss();
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &Fingerprint, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let key = key.as_str().to_string();
        let created_at = Utc::now();
        let expires_at = expiry_after(created_at, ttl).timestamp_millis();
        let max_entries = self.max_entries as i64;

        let evicted = self
            .with_conn(move |conn, seq| {
                let next = seq.fetch_add(1, Ordering::SeqCst) + 1;
                conn.execute(
                    "INSERT INTO cache_entries (key, value, created_at, expires_at, access_seq, hits)
                     VALUES (?1, ?2, ?3, ?4, ?5, 0)
                     ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        created_at = excluded.created_at,
                        expires_at = excluded.expires_at,
                        access_seq = excluded.access_seq,
                        hits = 0",
                    params![
                        key,
                        value,
                        created_at.timestamp_millis(),
                        expires_at,
                        next as i64
                    ],
                )?;

                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
                if count <= max_entries {
                    return Ok(0);
                }

                conn.execute(
                    "DELETE FROM cache_entries WHERE key IN (
                        SELECT key FROM cache_entries ORDER BY access_seq ASC LIMIT ?1
                     )",
                    params![count - max_entries],
                )
            })
            .await?;

        if evicted > 0 {
            tracing::trace!("Evicted {} least recently used entries", evicted);
            self.counters.evicted(evicted as u64);
        }
        Ok(())
    }

    async fn delete(&self, key: &Fingerprint) -> CacheResult<bool> {
        let key = key.as_str().to_string();
        let removed = self
            .with_conn(move |conn, _| {
                conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
            })
            .await?;
        Ok(removed > 0)
    }

    async fn clear(&self) -> CacheResult<()> {
        self.with_conn(|conn, _| conn.execute("DELETE FROM cache_entries", []))
            .await?;
        Ok(())
    }

    async fn sweep_expired(&self) -> CacheResult<usize> {
        let now = Utc::now().timestamp_millis();
        let removed = self
            .with_conn(move |conn, _| {
                conn.execute(
                    "DELETE FROM cache_entries WHERE expires_at <= ?1",
                    params![now],
                )
            })
            .await?;
        self.counters.expired(removed as u64);
        Ok(removed)
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        let count: i64 = self
            .with_conn(|conn, _| {
                conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))
            })
            .await?;
        Ok(self.counters.snapshot(count.max(0) as usize))
    }
}

fn unavailable(err: rusqlite::Error) -> CacheError {
    CacheError::unavailable(BACKEND, err)
}

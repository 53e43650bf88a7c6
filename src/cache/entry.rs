use chrono::{DateTime, Utc};
use std::time::Duration;

/// A stored stage result with its expiry metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub hits: u64,
}

impl CacheEntry {
    /// Creates an entry that expires `ttl` from now
    pub fn new(value: Vec<u8>, ttl: Duration) -> Self {
        let created_at = Utc::now();
        Self {
            value,
            created_at,
            expires_at: expiry_after(created_at, ttl),
            hits: 0,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Adds `ttl` to `start`, saturating at the largest representable time
pub fn expiry_after(start: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| start.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

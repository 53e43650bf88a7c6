use crate::fingerprint::Fingerprint;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async lock per fingerprint
///
/// Serialises work on the same key while leaving other keys independent.
/// The file backend uses it to make read, check and remove atomic per entry;
/// the orchestrator uses it so concurrent jobs compute a stage result once.
/// Locks are dropped from the map as soon as nobody holds or waits on them.
#[derive(Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<Fingerprint, Arc<AsyncMutex<()>>>>,
}

/// Held while the caller owns its key
pub struct KeyGuard<'a> {
    owner: &'a KeyLocks,
    key: Fingerprint,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyLocks {
    pub async fn lock(&self, key: &Fingerprint) -> KeyGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(key.clone()).or_default())
        };

        KeyGuard {
            owner: self,
            key: key.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of keys currently held or waited on
    pub fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.owner.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map's own reference left: no holder, no waiter
        if locks
            .get(&self.key)
            .map_or(false, |lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

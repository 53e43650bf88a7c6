//! Per-host politeness limits
//!
//! Two limits apply to every host independently of the worker pool size:
//! - a GCRA rate limit (sustained requests per second plus burst)
//! - a cap on concurrent in-flight requests
//!
//! Only collection attempts go through the throttle; cache hits and the
//! CPU-bound stages never touch a host.

use crate::config::RateLimitConfig;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Shared rate limiter and concurrency cap keyed by host
pub struct HostThrottle {
    limiter: DefaultKeyedRateLimiter<String>,
    slots: Mutex<HashMap<String, Arc<Semaphore>>>,
    max_concurrent: usize,
}

/// Held while a request to a host is in flight
///
/// Dropping the last permit of a host forgets that host, so a long run over
/// many hosts keeps state only for the ones currently being fetched.
pub struct HostPermit<'a> {
    owner: &'a HostThrottle,
    host: String,
    // None only if the semaphore was closed, which never happens
    permit: Option<OwnedSemaphorePermit>,
}

impl HostThrottle {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            limiter: RateLimiter::keyed(quota_for(config)),
            slots: Mutex::new(HashMap::new()),
            max_concurrent: config.max_concurrent_per_host.max(1) as usize,
        }
    }

    /// Waits until `host` has a free concurrency slot and a rate-limit cell
    ///
    /// The slot is taken first so a request never consumes a rate cell while
    /// it is still queued behind other in-flight requests.
    pub async fn acquire(&self, host: &str) -> HostPermit<'_> {
        // Built before the first await so a cancelled acquire still releases
        // its slot entry
        let mut held = HostPermit {
            owner: self,
            host: host.to_string(),
            permit: None,
        };
        held.permit = self.semaphore_for(host).acquire_owned().await.ok();

        self.limiter.until_key_ready(&held.host).await;
        tracing::trace!("Acquired request slot for {}", host);

        held
    }

    fn semaphore_for(&self, host: &str) -> Arc<Semaphore> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            slots
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.max_concurrent))),
        )
    }

    /// Drops the slot of `host` once nobody holds or waits on it
    fn release(&self, host: &str) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let idle = slots
            .get(host)
            .map_or(false, |slot| Arc::strong_count(slot) == 1);
        if idle {
            slots.remove(host);
            drop(slots);
            // Only discards hosts whose limiter state equals a fresh one
            self.limiter.retain_recent();
            tracing::trace!("Released idle host {}", host);
        }
    }

    /// Number of hosts with a request in flight or queued
    pub fn hosts_tracked(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }
}

impl Drop for HostPermit<'_> {
    fn drop(&mut self) {
        self.permit.take();
        self.owner.release(&self.host);
    }
}

impl std::fmt::Debug for HostPermit<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostPermit").field("host", &self.host).finish()
    }
}

fn quota_for(config: &RateLimitConfig) -> Quota {
    let burst = NonZeroU32::new(config.burst).unwrap_or(NonZeroU32::MIN);
    let quota = if config.requests_per_second >= f64::from(u32::MAX) {
        Quota::per_second(NonZeroU32::MAX)
    } else {
        // Rates too slow to represent fall back to one request per day
        let period = Duration::try_from_secs_f64(1.0 / config.requests_per_second)
            .unwrap_or(Duration::from_secs(86_400));
        Quota::with_period(period).unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX))
    };

    quota.allow_burst(burst)
}

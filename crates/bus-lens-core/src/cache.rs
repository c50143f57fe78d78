//! Short-lived cache for entity listings.
//!
//! Each [`ServiceBusClient`](crate::client::ServiceBusClient) owns one cache
//! per collection (queues, topics), so switching connections never reuses
//! another namespace's data. Subscriptions are not cached.

use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;

/// Default time a listing stays fresh
pub const DEFAULT_LIST_CACHE_TTL_SECONDS: i64 = 5 * 60;

/// Cached listing with the time it was fetched
struct CacheEntry<T> {
    data: Arc<Vec<T>>,
    fetched_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    fn is_valid_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.fetched_at < ttl
    }
}

/// TTL cache holding a single listing
pub struct ListCache<T> {
    ttl: Duration,
    entry: RwLock<Option<CacheEntry<T>>>,
}

impl<T> ListCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached listing if it is still fresh at `now`
    pub async fn get_fresh_at(&self, now: DateTime<Utc>) -> Option<Arc<Vec<T>>> {
        let entry = self.entry.read().await;
        entry
            .as_ref()
            .filter(|e| e.is_valid_at(now, self.ttl))
            .map(|e| Arc::clone(&e.data))
    }

    /// Return the cached listing, or run `fetch` and store its result.
    ///
    /// `force_refresh` always runs `fetch`. A failed fetch leaves the
    /// previous entry untouched.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        force_refresh: bool,
        fetch: F,
    ) -> Result<Arc<Vec<T>>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        if !force_refresh {
            if let Some(data) = self.get_fresh_at(Utc::now()).await {
                tracing::debug!("Serving listing from cache");
                return Ok(data);
            }
        }

        let data = Arc::new(fetch().await?);
        self.store(Arc::clone(&data), Utc::now()).await;
        Ok(data)
    }

    /// Overwrite the entry with `data` fetched at `fetched_at`
    pub async fn store(&self, data: Arc<Vec<T>>, fetched_at: DateTime<Utc>) {
        let mut entry = self.entry.write().await;
        *entry = Some(CacheEntry { data, fetched_at });
    }

    /// Drop the cached listing
    pub async fn invalidate(&self) {
        let mut entry = self.entry.write().await;
        *entry = None;
    }
}

impl<T> Default for ListCache<T> {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_LIST_CACHE_TTL_SECONDS))
    }
}

impl<T> std::fmt::Debug for ListCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListCache").field("ttl", &self.ttl).finish()
    }
}

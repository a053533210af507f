//! Process-local cache store backed by moka.

use std::time::{Duration, Instant};

use moka::{Expiry, future::Cache};

use super::{CacheError, CacheStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// Per-entry TTL; reads do not extend it.
struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _at: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-memory [`CacheStore`] with bounded capacity.
///
/// Clones share the same underlying cache.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Cache<String, Entry>,
}

impl MemoryStore {
    /// Creates a store holding at most `max_entries` values.
    #[must_use]
    pub fn new(max_entries: u64) -> Self {
        let inner = Cache::builder().max_capacity(max_entries).expire_after(EntryExpiry).build();
        Self { inner }
    }

    /// Number of live entries, after pending maintenance has run.
    pub async fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }
}

impl CacheStore for MemoryStore {
    async fn get<'a>(&'a self, key: &'a str) -> Result<Option<String>, CacheError> {
        Ok(self.inner.get(key).await.map(|entry| entry.value))
    }

    async fn set<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.inner.insert(key.to_owned(), Entry { value, ttl }).await;
        Ok(())
    }

    async fn close(self) -> Result<(), CacheError> {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryStore::new(10);
        store.set("k", "v".to_owned(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.get("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entry_expires() {
        let store = MemoryStore::new(10);
        store.set("k", "v".to_owned(), Duration::from_millis(50)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_resets_value() {
        let store = MemoryStore::new(10);
        store.set("k", "v1".to_owned(), Duration::from_secs(60)).await.unwrap();
        store.set("k", "v2".to_owned(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
        assert_eq!(store.entry_count().await, 1);
    }

    #[tokio::test]
    async fn test_close_clears_entries() {
        let store = MemoryStore::new(10);
        let handle = store.clone();
        store.set("k", "v".to_owned(), Duration::from_secs(60)).await.unwrap();
        store.close().await.unwrap();
        assert!(handle.get("k").await.unwrap().is_none());
    }
}

//! Best-effort response caching.
//!
//! [`ResponseCache`] sits in front of read-mostly backend calls. It is
//! advisory: store errors and slow store calls are logged and treated as a
//! miss (on read) or a no-op (on write), so a broken cache never fails a
//! request.
//!
//! Stores implement [`CacheStore`]. Two are provided:
//! - [`RedisStore`]: shared Redis instance (`GET` / `SET key value EX ttl`)
//! - [`MemoryStore`]: process-local TTL store

#[allow(
    redundant_imports,
    reason = "Future needed for RPITIT despite being in Edition 2024 prelude"
)]
use std::future::Future;
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{CacheBackend, CacheConfig};

mod memory;
mod redis;

pub use self::{memory::MemoryStore, redis::RedisStore};

/// Errors raised by a cache store.
///
/// Never surfaced to gateway callers; [`ResponseCache`] logs and absorbs them.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis command or connection failed.
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// A cached value could not be encoded or decoded.
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store did not answer within the operation timeout.
    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),

    /// Store-specific failure.
    #[error("cache store error: {0}")]
    Store(String),
}

/// Key-value store with per-entry expiry.
///
/// Implementations must be safe for concurrent use.
pub trait CacheStore: Send + Sync {
    /// Reads a value.
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> impl Future<Output = Result<Option<String>, CacheError>> + Send + 'a;

    /// Writes a value that expires after `ttl`.
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), CacheError>> + Send + 'a;

    /// Releases the store's connections.
    fn close(self) -> impl Future<Output = Result<(), CacheError>> + Send
    where
        Self: Sized;
}

/// Store selected at runtime from [`CacheConfig`].
#[derive(Debug, Clone)]
pub enum ConfiguredStore {
    /// Shared Redis instance.
    Redis(RedisStore),
    /// Process-local store.
    Memory(MemoryStore),
}

impl ConfiguredStore {
    /// Builds the configured store, or `None` when caching is disabled.
    ///
    /// # Errors
    ///
    /// Returns error if the Redis URL is invalid.
    pub fn from_config(config: &CacheConfig) -> Result<Option<Self>, CacheError> {
        if config.plans_ttl().is_none() {
            return Ok(None);
        }
        let store = match config.backend {
            CacheBackend::Redis => {
                let url = config
                    .redis_url
                    .as_deref()
                    .ok_or_else(|| CacheError::Store("redis_url is not configured".to_owned()))?;
                Self::Redis(RedisStore::open(url)?)
            }
            CacheBackend::Memory => Self::Memory(MemoryStore::new(config.max_entries)),
        };
        Ok(Some(store))
    }
}

impl CacheStore for ConfiguredStore {
    async fn get<'a>(&'a self, key: &'a str) -> Result<Option<String>, CacheError> {
        match self {
            Self::Redis(store) => store.get(key).await,
            Self::Memory(store) => store.get(key).await,
        }
    }

    async fn set<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        match self {
            Self::Redis(store) => store.set(key, value, ttl).await,
            Self::Memory(store) => store.set(key, value, ttl).await,
        }
    }

    async fn close(self) -> Result<(), CacheError> {
        match self {
            Self::Redis(store) => store.close().await,
            Self::Memory(store) => store.close().await,
        }
    }
}

/// Advisory TTL cache over a [`CacheStore`].
///
/// Enabled only when both a store and a positive TTL are present. A disabled
/// cache never touches a store: every read misses and every write is skipped.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use billing_gateway::cache::{MemoryStore, ResponseCache};
///
/// # async fn example() {
/// let cache = ResponseCache::new(Some(MemoryStore::new(100)), Some(Duration::from_secs(60)));
/// cache.set("listPlans", &vec!["plan_1"]).await;
///
/// let cached: Option<Vec<String>> = cache.get("listPlans").await;
/// assert_eq!(cached, Some(vec!["plan_1".to_owned()]));
/// # }
/// ```
#[derive(Debug)]
pub struct ResponseCache<S> {
    store: Option<S>,
    ttl: Option<Duration>,
    key_prefix: String,
    operation_timeout: Duration,
}

impl<S> ResponseCache<S> {
    /// Creates a cache. Zero TTLs disable caching.
    #[must_use]
    pub fn new(store: Option<S>, ttl: Option<Duration>) -> Self {
        Self {
            store,
            ttl: ttl.filter(|ttl| !ttl.is_zero()),
            key_prefix: String::new(),
            operation_timeout: Duration::from_millis(500),
        }
    }

    /// Creates a cache that never stores anything.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    /// Prepends `prefix` to every key.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Bounds every store call by `timeout`.
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Whether reads and writes reach the store.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.store.is_some() && self.ttl.is_some()
    }

    fn active(&self) -> Option<(&S, Duration)> {
        self.store.as_ref().zip(self.ttl)
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }
}

impl<S: CacheStore> ResponseCache<S> {
    /// Reads and decodes a cached value. Any failure is a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let (store, _) = self.active()?;
        let key = self.key(key);

        let raw = match tokio::time::timeout(self.operation_timeout, store.get(&key)).await {
            Ok(Ok(Some(raw))) => raw,
            Ok(Ok(None)) => {
                debug!(key = %key, "cache miss");
                return None;
            }
            Ok(Err(err)) => {
                warn!(key = %key, error = %err, "cache read failed");
                return None;
            }
            Err(_) => {
                let err = CacheError::Timeout(self.operation_timeout);
                warn!(key = %key, error = %err, "cache read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key = %key, "cache hit");
                Some(value)
            }
            Err(err) => {
                let err = CacheError::Serialization(err);
                warn!(key = %key, error = %err, "cached value is unreadable");
                None
            }
        }
    }

    /// Encodes and stores a value for the configured TTL. Any failure is logged.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let Some((store, ttl, key, raw)) = self.encode(key, value) else {
            return;
        };
        write(store, &key, raw, ttl, self.operation_timeout).await;
    }

    /// Like [`set`](Self::set), but runs the write on a background task so
    /// the caller never waits for the store.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_set<T: Serialize + ?Sized>(&self, key: &str, value: &T)
    where
        S: Clone + 'static,
    {
        let Some((store, ttl, key, raw)) = self.encode(key, value) else {
            return;
        };
        let store = store.clone();
        let timeout = self.operation_timeout;
        tokio::spawn(async move {
            write(&store, &key, raw, ttl, timeout).await;
        });
    }

    fn encode<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Option<(&S, Duration, String, String)> {
        let (store, ttl) = self.active()?;
        let key = self.key(key);
        match serde_json::to_string(value) {
            Ok(raw) => Some((store, ttl, key, raw)),
            Err(err) => {
                let err = CacheError::Serialization(err);
                warn!(key = %key, error = %err, "cache write failed");
                None
            }
        }
    }

    /// Releases the store's connections.
    pub async fn close(self) {
        let Some(store) = self.store else {
            return;
        };
        if let Err(err) = store.close().await {
            warn!(error = %err, "cache close failed");
        }
    }
}

async fn write<S: CacheStore>(store: &S, key: &str, raw: String, ttl: Duration, timeout: Duration) {
    match tokio::time::timeout(timeout, store.set(key, raw, ttl)).await {
        Ok(Ok(())) => debug!(key = %key, ttl_secs = ttl.as_secs(), "cached response"),
        Ok(Err(err)) => warn!(key = %key, error = %err, "cache write failed"),
        Err(_) => {
            let err = CacheError::Timeout(timeout);
            warn!(key = %key, error = %err, "cache write failed");
        }
    }
}

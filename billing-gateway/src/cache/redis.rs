//! Redis-backed cache store.

use std::time::Duration;

use redis::{Client, aio::MultiplexedConnection};
use tokio::sync::OnceCell;
use tracing::debug;

use super::{CacheError, CacheStore};

/// [`CacheStore`] over a shared Redis instance.
///
/// The multiplexed connection is opened on first use and shared by all
/// callers. Clones share the connection.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    connection: std::sync::Arc<OnceCell<MultiplexedConnection>>,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("connected", &self.connection.initialized())
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Creates a store for `url`. No connection is made until the first command.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is not a valid Redis URL.
    pub fn open(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url)?;
        Ok(Self { client, connection: std::sync::Arc::new(OnceCell::new()) })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                debug!("opening redis connection");
                self.client.get_multiplexed_async_connection().await
            })
            .await?;
        Ok(conn.clone())
    }
}

impl CacheStore for RedisStore {
    async fn get<'a>(&'a self, key: &'a str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        let value = redis::cmd("GET").arg(key).query_async::<Option<String>>(&mut conn).await?;
        Ok(value)
    }

    async fn set<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn close(self) -> Result<(), CacheError> {
        drop(self.connection);
        debug!("redis store closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_rejects_invalid_url() {
        assert!(RedisStore::open("not a redis url").is_err());
    }

    #[test]
    fn test_open_is_lazy() {
        let store = RedisStore::open("redis://127.0.0.1:1/").unwrap();
        assert!(format!("{store:?}").contains("connected: false"));
    }

    #[tokio::test]
    #[ignore = "requires a running Redis instance"]
    async fn test_redis_round_trip() {
        let store = RedisStore::open("redis://127.0.0.1/").unwrap();
        store.set("billing-gateway:test", "v".to_owned(), Duration::from_secs(5)).await.unwrap();
        assert_eq!(store.get("billing-gateway:test").await.unwrap().as_deref(), Some("v"));
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_server_fails() {
        let store = RedisStore::open("redis://127.0.0.1:1/").unwrap();
        assert!(matches!(store.get("k").await, Err(CacheError::Redis(_))));
    }
}

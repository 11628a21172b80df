//! Redis-based [`CacheStore`].
//!
//! # Namespaces
//!
//! A key written with `set_in_namespace` is also added to the set
//! `cache-index:<namespace>` in the same `MULTI` block. Sweeping a namespace
//! runs one Lua script that deletes the recorded keys and the index itself, so
//! invalidation is a single round trip over a bounded key set.

use crate::unavailable;
use agora_core::cache::{CacheError, CacheStore};
use futures::future::BoxFuture;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

const SWEEP_NAMESPACE: &str = r"
local keys = redis.call('SMEMBERS', KEYS[1])
local removed = 0
for i = 1, #keys, 500 do
  removed = removed + redis.call('DEL', unpack(keys, i, math.min(i + 499, #keys)))
end
redis.call('DEL', KEYS[1])
return removed
";

/// `Redis`-based cache store.
///
/// Keys are expected to live on one Redis node; the namespace sweep touches
/// keys it reads from the index set.
#[derive(Clone)]
pub struct RedisCacheStore {
    conn_manager: ConnectionManager,
}

impl RedisCacheStore {
    /// Wrap an existing connection manager.
    #[must_use]
    pub const fn new(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }

    /// Connect to `redis_url`, bounding every call by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if Redis cannot be reached.
    pub async fn connect(redis_url: &str, timeout: Duration) -> Result<Self, CacheError> {
        Ok(Self::new(crate::connect(redis_url, timeout).await?))
    }

    fn index_key(namespace: &str) -> String {
        format!("cache-index:{namespace}")
    }
}

impl CacheStore for RedisCacheStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, CacheError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.get(key).await.map_err(|e| unavailable(&e))
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: () = conn
                .set_ex(key, value, ttl.as_secs().max(1))
                .await
                .map_err(|e| unavailable(&e))?;
            Ok(())
        })
    }

    fn set_in_namespace<'a>(
        &'a self,
        namespace: &'a str,
        key: &'a str,
        value: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let index = Self::index_key(namespace);
            let ttl_secs = ttl.as_secs().max(1);

            // Index TTL follows the newest entry written into it
            #[allow(clippy::cast_possible_wrap)]
            let _: () = redis::pipe()
                .atomic()
                .set_ex(key, value, ttl_secs)
                .ignore()
                .sadd(&index, key)
                .ignore()
                .expire(&index, ttl_secs as i64)
                .ignore()
                .query_async(&mut conn)
                .await
                .map_err(|e| unavailable(&e))?;
            Ok(())
        })
    }

    fn delete<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(async move {
            if keys.is_empty() {
                return Ok(());
            }
            let mut conn = self.conn_manager.clone();
            let _: () = conn.del(keys).await.map_err(|e| unavailable(&e))?;
            Ok(())
        })
    }

    fn invalidate_namespace<'a>(
        &'a self,
        namespace: &'a str,
    ) -> BoxFuture<'a, Result<u64, CacheError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let removed: u64 = redis::Script::new(SWEEP_NAMESPACE)
                .key(Self::index_key(namespace))
                .invoke_async(&mut conn)
                .await
                .map_err(|e| unavailable(&e))?;

            tracing::debug!(namespace = %namespace, removed = removed, "Swept cache namespace");
            Ok(removed)
        })
    }
}

//! Redis-based fixed-window counter.
//!
//! `INCR` and `EXPIRE` run in one `MULTI` pipeline, so every gateway instance
//! sees the same count and no instance reads-then-writes.

use crate::unavailable;
use agora_core::cache::CacheError;
use agora_core::rate_limit::WindowCounter;
use futures::future::BoxFuture;
use redis::aio::ConnectionManager;
use std::time::Duration;

/// `Redis`-based window counter shared by all gateway instances.
#[derive(Clone)]
pub struct RedisWindowCounter {
    conn_manager: ConnectionManager,
}

impl RedisWindowCounter {
    /// Wrap an existing connection manager.
    #[must_use]
    pub const fn new(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }
}

impl WindowCounter for RedisWindowCounter {
    fn increment<'a>(
        &'a self,
        key: &'a str,
        window: Duration,
    ) -> BoxFuture<'a, Result<u64, CacheError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();

            #[allow(clippy::cast_possible_wrap)] // Safe: windows are far below i64::MAX seconds
            let (count,): (u64,) = redis::pipe()
                .atomic()
                .incr(key, 1)
                .expire(key, window.as_secs().max(1) as i64)
                .ignore()
                .query_async(&mut conn)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, key = %key, "Redis pipeline failed during rate limit increment");
                    unavailable(&e)
                })?;

            Ok(count)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn counters_are_shared_between_handles() {
        let conn = crate::connect("redis://127.0.0.1:6379", crate::DEFAULT_TIMEOUT).await.unwrap();
        let first = RedisWindowCounter::new(conn.clone());
        let second = RedisWindowCounter::new(conn);
        let key = format!("rate_limit:test:{}", uuid::Uuid::new_v4());
        let window = Duration::from_secs(60);

        assert_eq!(first.increment(&key, window).await.unwrap(), 1);
        assert_eq!(second.increment(&key, window).await.unwrap(), 2);
        assert_eq!(first.increment(&key, window).await.unwrap(), 3);
    }
}

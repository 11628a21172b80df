//! # Agora Cache
//!
//! Shared key-value state for Agora services:
//!
//! - [`RedisCacheStore`]: [`CacheStore`](agora_core::cache::CacheStore) on Redis,
//!   with namespace indexes so listing pages can be swept without `KEYS`
//! - [`RedisWindowCounter`]: fixed-window counters for the gateway rate limiter
//! - [`CacheAside`]: typed cache-aside wrapper that never fails a request

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod aside;
mod counter;
mod store;

pub use aside::CacheAside;
pub use counter::RedisWindowCounter;
pub use store::RedisCacheStore;

use agora_core::cache::CacheError;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use std::time::Duration;

/// Default deadline for connecting and for each command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(250);

/// Open a Redis connection manager whose connects and commands give up after
/// `timeout`, so a stalled server surfaces as [`CacheError::Unavailable`].
///
/// # Errors
///
/// Returns [`CacheError::Unavailable`] if the URL is invalid or Redis is unreachable.
pub async fn connect(redis_url: &str, timeout: Duration) -> Result<ConnectionManager, CacheError> {
    let client = redis::Client::open(redis_url)
        .map_err(|e| CacheError::Unavailable(format!("Failed to create Redis client: {e}")))?;

    let config = ConnectionManagerConfig::new()
        .set_connection_timeout(timeout)
        .set_response_timeout(timeout)
        .set_number_of_retries(1);

    ConnectionManager::new_with_config(client, config)
        .await
        .map_err(|e| {
            CacheError::Unavailable(format!("Failed to create Redis connection manager: {e}"))
        })
}

pub(crate) fn unavailable(e: &redis::RedisError) -> CacheError {
    CacheError::Unavailable(e.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use agora_core::cache::CacheStore;
    use tokio::net::TcpListener;

    /// Accepts connections and never writes a byte back.
    async fn silent_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("redis://{addr}")
    }

    #[tokio::test]
    async fn stalled_redis_fails_instead_of_hanging() {
        let url = silent_server().await;

        let outcome = tokio::time::timeout(Duration::from_secs(10), async {
            let conn = connect(&url, Duration::from_millis(100)).await?;
            RedisCacheStore::new(conn).get("post:p1").await
        })
        .await;

        let result = outcome.unwrap();
        assert!(matches!(result, Err(CacheError::Unavailable(_))));
    }

    #[tokio::test]
    async fn invalid_url_is_unavailable() {
        let err = connect("not a url", DEFAULT_TIMEOUT).await.err().unwrap();
        assert!(matches!(err, CacheError::Unavailable(_)));
    }
}

//! Typed cache-aside access.
//!
//! The cache never fails a request. A backend error turns a read into a miss
//! and an invalidation into a logged no-op; the caller then falls through to
//! its store.

use agora_core::cache::{CacheKey, CacheStore, Invalidation};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Cache-aside helper over a [`CacheStore`].
#[derive(Clone)]
pub struct CacheAside {
    store: Option<Arc<dyn CacheStore>>,
    ttl: Duration,
}

impl CacheAside {
    /// TTL used for listings and single items.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

    /// Cache backed by `store`, entries living for `ttl`.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            store: Some(store),
            ttl,
        }
    }

    /// A cache that always misses, for when the backend was unreachable at startup.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            store: None,
            ttl: Self::DEFAULT_TTL,
        }
    }

    /// Entry lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Read and decode a cached value. Errors and undecodable values are misses.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let store = self.store.as_ref()?;

        let raw = match store.get(key.as_str()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                metrics::counter!("agora_cache_misses_total").increment(1);
                return None;
            }
            Err(e) => {
                tracing::warn!(key = %key.as_str(), error = %e, "Cache read failed, treating as miss");
                metrics::counter!("agora_cache_errors_total").increment(1);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                metrics::counter!("agora_cache_hits_total").increment(1);
                Some(value)
            }
            Err(e) => {
                tracing::warn!(key = %key.as_str(), error = %e, "Discarding undecodable cache entry");
                metrics::counter!("agora_cache_misses_total").increment(1);
                None
            }
        }
    }

    /// Encode and store a value, recording listing keys in their namespace.
    pub async fn put<T: Serialize + Sync>(&self, key: &CacheKey, value: &T) {
        let Some(store) = self.store.as_ref() else {
            return;
        };

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(key = %key.as_str(), error = %e, "Failed to encode cache entry");
                return;
            }
        };

        let result = match key.namespace() {
            Some(namespace) => {
                store
                    .set_in_namespace(namespace.as_str(), key.as_str(), &raw, self.ttl)
                    .await
            }
            None => store.set(key.as_str(), &raw, self.ttl).await,
        };

        if let Err(e) = result {
            tracing::warn!(key = %key.as_str(), error = %e, "Cache write failed");
            metrics::counter!("agora_cache_errors_total").increment(1);
        }
    }

    /// Drop every key and namespace the invalidation names.
    pub async fn invalidate(&self, invalidation: &Invalidation) {
        let Some(store) = self.store.as_ref() else {
            return;
        };

        let keys: Vec<String> = invalidation
            .keys()
            .iter()
            .map(|key| key.as_str().to_string())
            .collect();
        if let Err(e) = store.delete(&keys).await {
            tracing::warn!(keys = ?keys, error = %e, "Cache invalidation skipped");
            metrics::counter!("agora_cache_errors_total").increment(1);
        }

        for namespace in invalidation.namespaces() {
            match store.invalidate_namespace(namespace.as_str()).await {
                Ok(removed) => {
                    tracing::debug!(namespace = %namespace.as_str(), removed = removed, "Cache namespace invalidated");
                }
                Err(e) => {
                    tracing::warn!(namespace = %namespace.as_str(), error = %e, "Cache namespace invalidation skipped");
                    metrics::counter!("agora_cache_errors_total").increment(1);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use agora_core::cache::Namespace;
    use agora_testing::InMemoryCacheStore;

    fn cache(store: &Arc<InMemoryCacheStore>) -> CacheAside {
        CacheAside::new(store.clone(), CacheAside::DEFAULT_TTL)
    }

    #[tokio::test]
    async fn put_then_get_round_trips_through_json() {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = cache(&store);
        let key = CacheKey::item("post", "1");

        cache.put(&key, &vec![1, 2, 3]).await;

        assert_eq!(cache.get::<Vec<i32>>(&key).await, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn invalidation_sweeps_listing_namespace_and_items() {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = cache(&store);
        let item = CacheKey::item("post", "1");
        let page_one = CacheKey::listing("post", 1, 10);
        let page_two = CacheKey::listing("post", 2, 5);
        let other = CacheKey::item("post", "2");

        for key in [&item, &page_one, &page_two, &other] {
            cache.put(key, &"cached").await;
        }

        cache
            .invalidate(
                &Invalidation::new()
                    .key(item.clone())
                    .namespace(Namespace::listings_of("post")),
            )
            .await;

        assert!(cache.get::<String>(&item).await.is_none());
        assert!(cache.get::<String>(&page_one).await.is_none());
        assert!(cache.get::<String>(&page_two).await.is_none());
        assert_eq!(cache.get::<String>(&other).await.as_deref(), Some("cached"));
    }

    #[tokio::test]
    async fn unavailable_backend_degrades_to_miss() {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = cache(&store);
        let key = CacheKey::item("post", "1");
        cache.put(&key, &"cached").await;

        store.set_available(false);

        assert!(cache.get::<String>(&key).await.is_none());
        // Must not panic or error
        cache.put(&key, &"fresh").await;
        cache.invalidate(&Invalidation::new().key(key.clone())).await;

        store.set_available(true);
        assert_eq!(cache.get::<String>(&key).await.as_deref(), Some("cached"));
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let store = Arc::new(InMemoryCacheStore::new());
        let key = CacheKey::item("post", "1");
        store
            .set(key.as_str(), "not json", CacheAside::DEFAULT_TTL)
            .await
            .unwrap();

        assert!(cache(&store).get::<Vec<i32>>(&key).await.is_none());
    }

    #[tokio::test]
    async fn disabled_cache_always_misses() {
        let cache = CacheAside::disabled();
        let key = CacheKey::item("post", "1");
        cache.put(&key, &1).await;
        assert!(cache.get::<i32>(&key).await.is_none());
    }
}

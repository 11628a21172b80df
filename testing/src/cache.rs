//! In-memory cache and counter stores with TTLs and outage simulation.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use agora_core::cache::{CacheError, CacheStore};
use agora_core::rate_limit::WindowCounter;
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, (String, Instant)>,
    namespaces: HashMap<String, HashSet<String>>,
}

/// In-memory [`CacheStore`]. Expired entries read as misses.
#[derive(Clone)]
pub struct InMemoryCacheStore {
    state: Arc<Mutex<CacheState>>,
    available: Arc<AtomicBool>,
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCacheStore {
    /// Empty, reachable cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate the backend going away (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Whether a live entry exists for `key`, bypassing the outage switch.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let state = self.state.lock().unwrap();
        state
            .entries
            .get(key)
            .is_some_and(|(_, expires_at)| *expires_at > Instant::now())
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let state = self.state.lock().unwrap();
        state.entries.values().filter(|(_, exp)| *exp > now).count()
    }

    /// Whether no live entries exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
    }

    fn write(&self, namespace: Option<&str>, key: &str, value: &str, ttl: Duration) {
        let mut state = self.state.lock().unwrap();
        state
            .entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        if let Some(namespace) = namespace {
            state
                .namespaces
                .entry(namespace.to_string())
                .or_default()
                .insert(key.to_string());
        }
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, CacheError>> {
        Box::pin(async move {
            self.check()?;
            let now = Instant::now();
            let mut state = self.state.lock().unwrap();
            let found = state
                .entries
                .get(key)
                .map(|(value, expires_at)| (value.clone(), *expires_at > now));
            match found {
                Some((value, true)) => Ok(Some(value)),
                Some((_, false)) => {
                    state.entries.remove(key);
                    Ok(None)
                }
                None => Ok(None),
            }
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(async move {
            self.check()?;
            self.write(None, key, value, ttl);
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
            self.check()?;
            self.write(Some(namespace), key, value, ttl);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(async move {
            self.check()?;
            let mut state = self.state.lock().unwrap();
            for key in keys {
                state.entries.remove(key);
            }
            Ok(())
        })
    }

    fn invalidate_namespace<'a>(
        &'a self,
        namespace: &'a str,
    ) -> BoxFuture<'a, Result<u64, CacheError>> {
        Box::pin(async move {
            self.check()?;
            let mut state = self.state.lock().unwrap();
            let keys = state.namespaces.remove(namespace).unwrap_or_default();
            let removed = keys
                .iter()
                .filter(|key| state.entries.remove(*key).is_some())
                .count();
            Ok(removed as u64)
        })
    }
}

/// In-memory [`WindowCounter`]. Share one instance between gateway instances to
/// model a shared counter store.
#[derive(Clone)]
pub struct InMemoryWindowCounter {
    counters: Arc<Mutex<HashMap<String, (u64, Instant)>>>,
    available: Arc<AtomicBool>,
}

impl Default for InMemoryWindowCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWindowCounter {
    /// Empty, reachable counter store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Mutex::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate the backend going away (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl WindowCounter for InMemoryWindowCounter {
    fn increment<'a>(
        &'a self,
        key: &'a str,
        window: Duration,
    ) -> BoxFuture<'a, Result<u64, CacheError>> {
        Box::pin(async move {
            if !self.available.load(Ordering::SeqCst) {
                return Err(CacheError::Unavailable("connection refused".to_string()));
            }
            let now = Instant::now();
            let mut counters = self.counters.lock().unwrap();
            let entry = counters.entry(key.to_string()).or_insert((0, now + window));
            if entry.1 <= now {
                *entry = (0, now + window);
            }
            entry.0 += 1;
            Ok(entry.0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryCacheStore::new();
        cache.set("post:1", "v", Duration::from_millis(20)).await.unwrap();
        assert_eq!(cache.get("post:1").await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("post:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn outage_surfaces_as_unavailable() {
        let cache = InMemoryCacheStore::new();
        cache.set_available(false);
        assert!(matches!(
            cache.get("post:1").await,
            Err(CacheError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn counter_is_shared_between_clones() {
        let counter = InMemoryWindowCounter::new();
        let other = counter.clone();
        let window = Duration::from_secs(60);

        assert_eq!(counter.increment("k", window).await.unwrap(), 1);
        assert_eq!(other.increment("k", window).await.unwrap(), 2);
    }
}

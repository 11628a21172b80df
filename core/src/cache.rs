//! Cache-aside storage and invalidation namespaces.
//!
//! Keys follow two shapes:
//!
//! - items: `<entity>:<id>`, for example `post:42`
//! - listings: `<entity>s:page=<p>:limit=<l>`, for example `posts:page=1:limit=10`
//!
//! Listing keys are parameterized and cannot be addressed one by one, so they
//! belong to a [`Namespace`] and are dropped all together. Writers describe
//! what they affect with an [`Invalidation`].

use futures::future::BoxFuture;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when talking to the cache backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Backend unreachable or command failed
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// Cached value could not be (de)serialized
    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

/// A group of keys that is invalidated as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// Listing namespace of an entity: `post` becomes `posts`.
    #[must_use]
    pub fn listings_of(entity: &str) -> Self {
        Self(format!("{entity}s"))
    }

    /// Namespace name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A fully formed cache key, optionally tied to a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    key: String,
    namespace: Option<Namespace>,
}

impl CacheKey {
    /// Single-item key: `<entity>:<id>`.
    #[must_use]
    pub fn item(entity: &str, id: &str) -> Self {
        Self {
            key: format!("{entity}:{id}"),
            namespace: None,
        }
    }

    /// Listing key: `<entity>s:page=<p>:limit=<l>` in the entity's listing namespace.
    #[must_use]
    pub fn listing(entity: &str, page: u32, limit: u32) -> Self {
        let namespace = Namespace::listings_of(entity);
        Self {
            key: format!("{}:page={page}:limit={limit}", namespace.as_str()),
            namespace: Some(namespace),
        }
    }

    /// The raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Namespace the key is swept with, if any.
    #[must_use]
    pub const fn namespace(&self) -> Option<&Namespace> {
        self.namespace.as_ref()
    }
}

/// Everything a write declares stale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invalidation {
    keys: Vec<CacheKey>,
    namespaces: Vec<Namespace>,
}

impl Invalidation {
    /// Empty invalidation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate one key.
    #[must_use]
    pub fn key(mut self, key: CacheKey) -> Self {
        self.keys.push(key);
        self
    }

    /// Invalidate every key in a namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: Namespace) -> Self {
        if !self.namespaces.contains(&namespace) {
            self.namespaces.push(namespace);
        }
        self
    }

    /// Keys to delete.
    #[must_use]
    pub fn keys(&self) -> &[CacheKey] {
        &self.keys
    }

    /// Namespaces to sweep.
    #[must_use]
    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }
}

/// Shared key-value store used for cache-aside reads.
///
/// Every operation is a single atomic round trip against the backend.
pub trait CacheStore: Send + Sync {
    /// Read a value.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, CacheError>>;

    /// Write a value with a TTL.
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), CacheError>>;

    /// Write a value with a TTL and record it under `namespace`.
    fn set_in_namespace<'a>(
        &'a self,
        namespace: &'a str,
        key: &'a str,
        value: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), CacheError>>;

    /// Delete keys. Missing keys are ignored.
    fn delete<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, Result<(), CacheError>>;

    /// Delete every key recorded under `namespace`, returning how many were removed.
    fn invalidate_namespace<'a>(&'a self, namespace: &'a str)
    -> BoxFuture<'a, Result<u64, CacheError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shapes() {
        assert_eq!(CacheKey::item("post", "42").as_str(), "post:42");
        assert!(CacheKey::item("post", "42").namespace().is_none());

        let listing = CacheKey::listing("post", 2, 10);
        assert_eq!(listing.as_str(), "posts:page=2:limit=10");
        assert_eq!(listing.namespace().map(Namespace::as_str), Some("posts"));
    }

    #[test]
    fn invalidation_deduplicates_namespaces() {
        let invalidation = Invalidation::new()
            .key(CacheKey::item("post", "1"))
            .namespace(Namespace::listings_of("post"))
            .namespace(Namespace::listings_of("post"));

        assert_eq!(invalidation.keys().len(), 1);
        assert_eq!(invalidation.namespaces().len(), 1);
    }
}

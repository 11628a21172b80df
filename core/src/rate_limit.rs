//! Shared fixed-window counters for rate limiting.

use crate::cache::CacheError;
use futures::future::BoxFuture;
use std::time::Duration;

/// A counter store visible to every gateway instance.
///
/// `increment` must be atomic across instances: increment the key and make sure
/// it expires with the window, in one round trip.
pub trait WindowCounter: Send + Sync {
    /// Increment `key`, returning the value after the increment.
    fn increment<'a>(&'a self, key: &'a str, window: Duration)
    -> BoxFuture<'a, Result<u64, CacheError>>;
}

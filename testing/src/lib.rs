//! # Agora Testing
//!
//! In-memory stand-ins for every infrastructure seam in `agora-core`, so
//! services can be exercised end to end inside one test process.
//!
//! - [`InMemoryEventBus`]: same settlement and redelivery protocol as the broker
//! - [`InMemoryCacheStore`] and [`InMemoryWindowCounter`]: TTL-aware, can be
//!   switched off to simulate an outage
//! - in-memory stores for each service ([`stores`])
//! - peer lookup stubs with failure and latency injection ([`peers`])
//!
//! ## Example
//!
//! ```
//! use agora_testing::InMemoryEventBus;
//! use agora_core::event_bus::EventBus;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = InMemoryEventBus::new();
//! bus.publish("post.created", b"{}").await?;
//! assert_eq!(bus.published().len(), 1);
//! # Ok(())
//! # }
//! ```

use agora_core::environment::{Clock, IdGenerator};
use chrono::{DateTime, Utc};

mod cache;
mod event_bus;
pub mod peers;
pub mod stores;

pub use cache::{InMemoryCacheStore, InMemoryWindowCounter};
pub use event_bus::{InMemoryEventBus, PublishedMessage};
pub use peers::{StubMediaLookup, StubUserLookup};
pub use stores::{
    InMemoryBlobStore, InMemoryCommentStore, InMemoryLikeStore, InMemoryMediaStore,
    InMemoryPostStore, InMemoryRefreshTokenStore, InMemorySearchIndex, InMemoryUserStore,
};

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, Utc};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use agora_testing::mocks::FixedClock;
    /// use agora_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::days(20_089))
    }

    /// Predictable ids: `<prefix>-1`, `<prefix>-2`, ...
    #[derive(Debug)]
    pub struct SequentialIdGenerator {
        prefix: String,
        next: AtomicU64,
    }

    impl SequentialIdGenerator {
        /// Generator producing ids with `prefix`.
        #[must_use]
        pub fn new(prefix: impl Into<String>) -> Self {
            Self {
                prefix: prefix.into(),
                next: AtomicU64::new(1),
            }
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn next_id(&self) -> String {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            format!("{}-{n}", self.prefix)
        }
    }
}

/// Install a test subscriber once; later calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub use mocks::{FixedClock, SequentialIdGenerator, test_clock};

//! # Agora Core
//!
//! Shared vocabulary for the Agora services: the domain model, typed lifecycle
//! events, and the traits every piece of infrastructure is injected through.
//!
//! ## Core Concepts
//!
//! - **Event bus**: topic publish plus at-least-once subscription delivery with
//!   explicit settlement ([`event_bus`], [`events`])
//! - **Projection**: an idempotent consumer that keeps a derived store in sync
//!   with the system of record ([`projection`])
//! - **Cache**: cache-aside storage with invalidation namespaces ([`cache`])
//! - **Stores**: per-service persistence seams ([`store`])
//! - **Peers**: batched lookups against other services ([`peers`])
//!
//! Nothing in this crate holds global state. Services build concrete adapters in
//! `main` and hand them to components as `Arc<dyn Trait>`.

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod cache;
pub mod event_bus;
pub mod events;
pub mod model;
pub mod peers;
pub mod projection;
pub mod rate_limit;
pub mod store;
pub mod token;

/// Header the gateway uses to forward the verified subject to backend services.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Environment module - injected dependencies that are not infrastructure adapters.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability.
    pub trait Clock: Send + Sync {
        /// Get the current time.
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock backed by [`Utc::now`].
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Identifier generator, so tests can predict ids.
    pub trait IdGenerator: Send + Sync {
        /// Produce a fresh unique identifier.
        fn next_id(&self) -> String;
    }

    /// Random v4 UUIDs.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UuidIdGenerator;

    impl IdGenerator for UuidIdGenerator {
        fn next_id(&self) -> String {
            uuid::Uuid::new_v4().to_string()
        }
    }
}

//! Projection abstraction for derived read models.
//!
//! A projection keeps a service-local store in sync with the post lifecycle
//! published by post-service. Projections are applied under at-least-once
//! delivery, so every implementation must be idempotent:
//!
//! - creation is an upsert keyed by the natural id
//! - deletion is delete-if-exists; an absent row is success
//!
//! Only infrastructure failures are returned as errors. The subscriber turns
//! them into a redelivery; nothing here is allowed to take the process down.

use crate::events::PostEvent;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur while applying an event to a projection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    /// The projection's store is unreachable or rejected the write
    #[error("Storage error: {0}")]
    Storage(String),

    /// The blob provider failed
    #[error("Blob storage error: {0}")]
    Blob(String),

    /// Some items of a batch failed; the rest were applied
    #[error("{failed} of {total} items failed: {reason}")]
    Partial {
        /// Number of items that still need work
        failed: usize,
        /// Number of items in the batch
        total: usize,
        /// First failure seen
        reason: String,
    },
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// A read model maintained from post lifecycle events.
pub trait Projection: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &str;

    /// Apply one event.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures that a redelivery could fix.
    fn apply_event<'a>(
        &'a self,
        event: &'a PostEvent,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

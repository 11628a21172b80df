//! Batched lookups against peer services.
//!
//! Lookups return a map keyed by id. Ids missing from the map are unresolved,
//! which callers treat as "deleted or unavailable", never as an error. An `Err`
//! means the whole lookup failed (peer down, timeout, bad response).

use crate::model::{Media, UserSummary};
use futures::future::BoxFuture;
use std::collections::HashMap;
use thiserror::Error;

/// Most ids a peer accepts in one lookup. Callers split larger sets.
pub const MAX_LOOKUP_IDS: usize = 100;

/// Errors raised by peer lookups.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    /// The peer did not answer within the deadline
    #[error("Peer '{peer}' timed out")]
    Timeout {
        /// Peer service name
        peer: String,
    },

    /// Connection failed or the peer answered with an error status
    #[error("Peer '{peer}' unavailable: {reason}")]
    Unavailable {
        /// Peer service name
        peer: String,
        /// Transport or status detail
        reason: String,
    },

    /// The peer answered with a body we could not read
    #[error("Peer '{peer}' sent an invalid response: {reason}")]
    InvalidResponse {
        /// Peer service name
        peer: String,
        /// Decoder message
        reason: String,
    },
}

/// Resolve user summaries by id (identity-service).
pub trait UserLookup: Send + Sync {
    /// Look up at most [`MAX_LOOKUP_IDS`] ids in one call.
    fn users_by_ids<'a>(
        &'a self,
        ids: &'a [String],
    ) -> BoxFuture<'a, Result<HashMap<String, UserSummary>, PeerError>>;
}

/// Resolve media metadata by id (media-service).
pub trait MediaLookup: Send + Sync {
    /// Look up at most [`MAX_LOOKUP_IDS`] ids in one call.
    fn media_by_ids<'a>(
        &'a self,
        ids: &'a [String],
    ) -> BoxFuture<'a, Result<HashMap<String, Media>, PeerError>>;
}

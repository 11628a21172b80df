//! Typed post lifecycle events.
//!
//! The routing key travels as message metadata; the payload is the JSON body
//! of the matching [`PostEvent`] variant. Encoding validates the event, so a
//! malformed event never reaches the broker, and decoding rejects routing keys
//! no variant claims.
//!
//! # Wire format
//!
//! ```text
//! post.created  {"postId","userId","content","createdAt"}
//! post.deleted  {"postId","userId","mediaIDs":[...]}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while encoding or decoding lifecycle events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The routing key does not name a known event
    #[error("Unknown routing key: {0}")]
    UnknownRoutingKey(String),

    /// The payload could not be parsed for its routing key
    #[error("Malformed '{routing_key}' payload: {reason}")]
    MalformedPayload {
        /// Routing key the payload arrived with
        routing_key: String,
        /// Parser message
        reason: String,
    },

    /// The event failed validation before publishing
    #[error("Invalid event: {0}")]
    Invalid(String),
}

/// Routing keys of the events on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingKey {
    /// `post.created`
    PostCreated,
    /// `post.deleted`
    PostDeleted,
}

impl RoutingKey {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PostCreated => "post.created",
            Self::PostDeleted => "post.deleted",
        }
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingKey {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post.created" => Ok(Self::PostCreated),
            "post.deleted" => Ok(Self::PostDeleted),
            other => Err(EventError::UnknownRoutingKey(other.to_string())),
        }
    }
}

/// Payload of `post.created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCreated {
    /// New post
    pub post_id: String,
    /// Author
    pub user_id: String,
    /// Body text
    pub content: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Payload of `post.deleted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDeleted {
    /// Deleted post
    pub post_id: String,
    /// User who deleted it
    pub user_id: String,
    /// Media the post referenced
    #[serde(rename = "mediaIDs", default)]
    pub media_ids: Vec<String>,
}

/// A post lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostEvent {
    /// A post was persisted
    Created(PostCreated),
    /// A post was removed
    Deleted(PostDeleted),
}

impl PostEvent {
    /// Routing key this event is published under.
    #[must_use]
    pub const fn routing_key(&self) -> RoutingKey {
        match self {
            Self::Created(_) => RoutingKey::PostCreated,
            Self::Deleted(_) => RoutingKey::PostDeleted,
        }
    }

    /// Id of the post the event is about.
    #[must_use]
    pub fn post_id(&self) -> &str {
        match self {
            Self::Created(e) => &e.post_id,
            Self::Deleted(e) => &e.post_id,
        }
    }

    /// Check the invariants every published event must satisfy.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Invalid`] when an id is blank, a created post has
    /// no content, or a deleted post lists a blank media id.
    pub fn validate(&self) -> Result<(), EventError> {
        let (post_id, user_id) = match self {
            Self::Created(e) => (&e.post_id, &e.user_id),
            Self::Deleted(e) => (&e.post_id, &e.user_id),
        };
        if post_id.trim().is_empty() {
            return Err(EventError::Invalid("postId must not be empty".to_string()));
        }
        if user_id.trim().is_empty() {
            return Err(EventError::Invalid("userId must not be empty".to_string()));
        }
        match self {
            Self::Created(e) if e.content.trim().is_empty() => {
                Err(EventError::Invalid("content must not be empty".to_string()))
            }
            Self::Deleted(e) if e.media_ids.iter().any(|id| id.trim().is_empty()) => {
                Err(EventError::Invalid("mediaIDs must not contain blank ids".to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Validate and serialize the payload body.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Invalid`] if validation fails.
    pub fn encode(&self) -> Result<Vec<u8>, EventError> {
        self.validate()?;
        let body = match self {
            Self::Created(e) => serde_json::to_vec(e),
            Self::Deleted(e) => serde_json::to_vec(e),
        };
        body.map_err(|e| EventError::Invalid(e.to_string()))
    }

    /// Parse a payload received under `routing_key`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::UnknownRoutingKey`] for keys no variant claims and
    /// [`EventError::MalformedPayload`] when the body does not parse.
    pub fn decode(routing_key: &str, payload: &[u8]) -> Result<Self, EventError> {
        let key = routing_key.parse::<RoutingKey>()?;
        let malformed = |e: serde_json::Error| EventError::MalformedPayload {
            routing_key: routing_key.to_string(),
            reason: e.to_string(),
        };
        match key {
            RoutingKey::PostCreated => serde_json::from_slice(payload)
                .map(Self::Created)
                .map_err(malformed),
            RoutingKey::PostDeleted => serde_json::from_slice(payload)
                .map(Self::Deleted)
                .map_err(malformed),
        }
    }
}

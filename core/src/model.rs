//! Domain entities owned by the individual services.
//!
//! Every entity serializes with camelCase field names, matching the JSON the
//! HTTP surface and the peer lookups exchange.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account (identity-service).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique identifier
    pub id: String,
    /// Unique display handle
    pub username: String,
    /// Unique, stored lowercased
    pub email: String,
    /// Argon2 PHC string; never serialized
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    /// Registration time
    pub created_at: DateTime<Utc>,
}

/// Public projection of a [`User`] returned by batched lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    /// User id
    pub id: String,
    /// Display handle
    pub username: String,
}

impl UserSummary {
    /// Placeholder used when an author could not be resolved.
    #[must_use]
    pub fn unknown(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: "Unknown".to_string(),
        }
    }
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
        }
    }
}

/// The system-of-record content unit (post-service).
///
/// `like_count` and `comment_count` are denormalized. They are only ever moved
/// by atomic increments paired with a like/comment write, and nothing recounts
/// them, so they can drift from the true row counts after a lost race or a
/// failure between the row write and the counter update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Unique identifier
    pub id: String,
    /// Author's user id
    pub author_id: String,
    /// Body text
    pub content: String,
    /// Media attached at creation time
    pub media_ids: Vec<String>,
    /// Denormalized like counter
    pub like_count: i64,
    /// Denormalized comment counter
    pub comment_count: i64,
    /// Creation time; listings sort on it descending
    pub created_at: DateTime<Utc>,
}

/// Which denormalized counter on a [`Post`] to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostCounter {
    /// `likeCount`
    Likes,
    /// `commentCount`
    Comments,
}

/// A user's like on a post. `(post_id, user_id)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    /// Liked post
    pub post_id: String,
    /// Liking user
    pub user_id: String,
    /// When the like was recorded
    pub created_at: DateTime<Utc>,
}

/// A comment on a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Unique identifier
    pub id: String,
    /// Post commented on
    pub post_id: String,
    /// Commenting user
    pub user_id: String,
    /// Body text
    pub content: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// An uploaded asset (media-service).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    /// Unique identifier
    pub id: String,
    /// Identifier of the blob at the storage provider
    pub public_id: String,
    /// File name supplied by the uploader
    pub original_name: String,
    /// MIME type supplied by the uploader
    pub mime_type: String,
    /// Public URL of the blob
    pub url: String,
    /// Uploading user
    pub owner_user_id: String,
    /// Upload time
    pub created_at: DateTime<Utc>,
}

/// Searchable projection of a [`Post`] (search-service). Keyed by `post_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIndexEntry {
    /// Indexed post
    pub post_id: String,
    /// Post author
    pub user_id: String,
    /// Indexed text
    pub content: String,
    /// Post creation time
    pub created_at: DateTime<Utc>,
}

/// Session continuation credential (identity-service). Single use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    /// Opaque random token
    pub token: String,
    /// Owner
    pub user_id: String,
    /// Hard expiry
    pub expires_at: DateTime<Utc>,
}

impl RefreshToken {
    /// Whether the token is past its expiry at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Page number, starting at 1
    pub page: u32,
    /// Items per page
    pub limit: u32,
}

impl PageRequest {
    /// Largest page size accepted from clients.
    pub const MAX_LIMIT: u32 = 100;

    /// Build a page request, clamping to `page >= 1` and `1..=MAX_LIMIT`.
    #[must_use]
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    /// Number of rows to skip.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

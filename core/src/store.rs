//! Persistence seams, one trait per service-owned collection.
//!
//! Each service owns its store; nothing here spans two services. Adapters live
//! in `agora-postgres` (production) and `agora-testing` (in-memory).

use crate::model::{
    Comment, Like, Media, PageRequest, Post, PostCounter, RefreshToken, SearchIndexEntry, User,
};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use thiserror::Error;

/// Errors returned by store adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A unique constraint rejected the write
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The store is unreachable or the query failed
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A row could not be mapped back to the domain type
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Accounts (identity-service).
pub trait UserStore: Send + Sync {
    /// Insert a new user. Duplicate username or email yields [`StoreError::AlreadyExists`].
    fn insert<'a>(&'a self, user: &'a User) -> BoxFuture<'a, Result<()>>;

    /// Look up by (lowercased) email.
    fn find_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<Option<User>>>;

    /// Look up by id.
    fn find_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<User>>>;

    /// Fetch every user whose id is in `ids`. Unknown ids are skipped.
    fn find_many<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Result<Vec<User>>>;
}

/// Refresh tokens (identity-service).
pub trait RefreshTokenStore: Send + Sync {
    /// Store a new token.
    fn insert<'a>(&'a self, token: &'a RefreshToken) -> BoxFuture<'a, Result<()>>;

    /// Remove and return the token in one step, so it can be used once only.
    fn consume<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<Option<RefreshToken>>>;

    /// Drop every token that expired before `now`.
    fn purge_expired(&self, now: DateTime<Utc>) -> BoxFuture<'_, Result<u64>>;
}

/// Posts (post-service).
pub trait PostStore: Send + Sync {
    /// Persist a new post.
    fn insert<'a>(&'a self, post: &'a Post) -> BoxFuture<'a, Result<()>>;

    /// Fetch one post.
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Post>>>;

    /// Delete a post, returning it if it existed.
    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Post>>>;

    /// One page ordered by `created_at` descending.
    fn page(&self, page: PageRequest) -> BoxFuture<'_, Result<Vec<Post>>>;

    /// Total number of posts.
    fn count(&self) -> BoxFuture<'_, Result<u64>>;

    /// Atomically add `delta` to a counter, never going below zero.
    ///
    /// Returns the new value, or `None` if the post does not exist.
    fn adjust_counter<'a>(
        &'a self,
        id: &'a str,
        counter: PostCounter,
        delta: i64,
    ) -> BoxFuture<'a, Result<Option<i64>>>;
}

/// Likes (post-service). `(post_id, user_id)` is unique.
pub trait LikeStore: Send + Sync {
    /// Record a like. An existing pair yields [`StoreError::AlreadyExists`].
    fn insert<'a>(&'a self, like: &'a Like) -> BoxFuture<'a, Result<()>>;

    /// Remove a like, returning whether a row was removed.
    fn remove<'a>(&'a self, post_id: &'a str, user_id: &'a str) -> BoxFuture<'a, Result<bool>>;
}

/// Comments (post-service).
pub trait CommentStore: Send + Sync {
    /// Persist a comment.
    fn insert<'a>(&'a self, comment: &'a Comment) -> BoxFuture<'a, Result<()>>;

    /// Newest comments on a post, newest first.
    fn latest_for_post<'a>(
        &'a self,
        post_id: &'a str,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<Comment>>>;
}

/// Media rows (media-service).
pub trait MediaStore: Send + Sync {
    /// Persist an uploaded asset.
    fn insert<'a>(&'a self, media: &'a Media) -> BoxFuture<'a, Result<()>>;

    /// Fetch one row.
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Media>>>;

    /// Fetch every row whose id is in `ids`. Unknown ids are skipped.
    fn find_many<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Result<Vec<Media>>>;

    /// Every row, newest first.
    fn list_all(&self) -> BoxFuture<'_, Result<Vec<Media>>>;

    /// Delete a row, returning whether it existed.
    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<bool>>;
}

/// Full-text index of posts (search-service).
pub trait SearchIndex: Send + Sync {
    /// Insert the entry unless one with the same `post_id` exists.
    ///
    /// Returns `true` when a row was inserted.
    fn upsert<'a>(&'a self, entry: &'a SearchIndexEntry) -> BoxFuture<'a, Result<bool>>;

    /// Remove by post id, returning whether a row was removed.
    fn remove<'a>(&'a self, post_id: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Best matches for `query`, best first.
    fn search<'a>(
        &'a self,
        query: &'a str,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<SearchIndexEntry>>>;
}

/// Errors returned by blob providers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlobError {
    /// No blob with that id
    #[error("Blob not found: {0}")]
    NotFound(String),

    /// Provider unreachable or rejected the request
    #[error("Blob provider error: {0}")]
    Provider(String),
}

/// Where a blob ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Provider id, used for deletion
    pub public_id: String,
    /// Public URL
    pub url: String,
}

/// External blob storage with upload and delete.
pub trait BlobStore: Send + Sync {
    /// Upload bytes.
    fn upload<'a>(
        &'a self,
        original_name: &'a str,
        mime_type: &'a str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'a, std::result::Result<StoredBlob, BlobError>>;

    /// Delete a blob.
    fn delete<'a>(&'a self, public_id: &'a str) -> BoxFuture<'a, std::result::Result<(), BlobError>>;
}

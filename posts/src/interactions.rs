//! Likes and comments.
//!
//! Counters on the post move by atomic increments paired with the row write
//! and are never recounted. The like toggle relies on the unique
//! `(post_id, user_id)` constraint: it inserts first and treats a uniqueness
//! rejection as "already liked", so two concurrent likes cannot both land.

use crate::error::{PostError, Result};
use crate::feed::FeedReader;
use crate::service::post_invalidation;
use agora_cache::CacheAside;
use agora_core::environment::{Clock, IdGenerator};
use agora_core::model::{Comment, Like, PostCounter, UserSummary};
use agora_core::store::{CommentStore, LikeStore, PostStore, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Longest comment, in characters, after trimming.
pub const MAX_COMMENT_CHARS: usize = 1000;

/// Comments returned per post.
pub const COMMENTS_PAGE: u32 = 20;

/// Result of a like toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeToggle {
    /// Whether the caller now likes the post
    pub liked: bool,
    /// Counter value after the toggle
    pub like_count: i64,
}

/// Input of [`Interactions::add_comment`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewComment {
    /// Body text
    pub content: String,
}

/// A comment with its author resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    /// The stored comment
    #[serde(flatten)]
    pub comment: Comment,
    /// Author, or the "Unknown" placeholder
    pub user: UserSummary,
}

/// Like and comment operations.
#[derive(Clone)]
pub struct Interactions {
    posts: Arc<dyn PostStore>,
    likes: Arc<dyn LikeStore>,
    comments: Arc<dyn CommentStore>,
    cache: CacheAside,
    feed: FeedReader,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl Interactions {
    /// Build the engine.
    #[must_use]
    pub fn new(
        posts: Arc<dyn PostStore>,
        likes: Arc<dyn LikeStore>,
        comments: Arc<dyn CommentStore>,
        cache: CacheAside,
        feed: FeedReader,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            posts,
            likes,
            comments,
            cache,
            feed,
            clock,
            ids,
        }
    }

    /// Like the post, or unlike it if `user_id` already does.
    ///
    /// # Errors
    ///
    /// [`PostError::NotFound`] if the post does not exist.
    pub async fn toggle_like(&self, post_id: &str, user_id: &str) -> Result<LikeToggle> {
        let post = self.posts.get(post_id).await?.ok_or(PostError::NotFound)?;

        let like = Like {
            post_id: post_id.to_string(),
            user_id: user_id.to_string(),
            created_at: self.clock.now(),
        };
        let toggle = match self.likes.insert(&like).await {
            Ok(()) => match self.adjust(post_id, PostCounter::Likes, 1).await {
                Ok(like_count) => LikeToggle {
                    liked: true,
                    like_count,
                },
                Err(e) => {
                    // Row and counter move together or not at all
                    if let Err(undo) = self.likes.remove(post_id, user_id).await {
                        tracing::error!(post_id = %post_id, user_id = %user_id, error = %undo, "Failed to roll back like");
                    }
                    return Err(e);
                }
            },
            Err(StoreError::AlreadyExists(_)) => {
                let like_count = if self.likes.remove(post_id, user_id).await? {
                    match self.adjust(post_id, PostCounter::Likes, -1).await {
                        Ok(like_count) => like_count,
                        Err(e) => {
                            if let Err(undo) = self.likes.insert(&like).await {
                                tracing::error!(post_id = %post_id, user_id = %user_id, error = %undo, "Failed to roll back unlike");
                            }
                            return Err(e);
                        }
                    }
                } else {
                    // A concurrent unlike removed the row first and owns the decrement
                    post.like_count
                };
                LikeToggle {
                    liked: false,
                    like_count,
                }
            }
            Err(e) => return Err(e.into()),
        };

        self.cache.invalidate(&post_invalidation(post_id)).await;
        tracing::info!(post_id = %post_id, user_id = %user_id, liked = toggle.liked, like_count = toggle.like_count, "Like toggled");
        Ok(toggle)
    }

    /// Add a comment and bump the post's comment counter.
    ///
    /// # Errors
    ///
    /// [`PostError::Validation`] for empty or oversized content,
    /// [`PostError::NotFound`] if the post does not exist.
    pub async fn add_comment(&self, post_id: &str, user_id: &str, input: NewComment) -> Result<Comment> {
        let content = input.content.trim().to_string();
        let length = content.chars().count();
        if length == 0 {
            return Err(PostError::Validation("Comment content required".to_string()));
        }
        if length > MAX_COMMENT_CHARS {
            return Err(PostError::Validation(format!(
                "Comment must be at most {MAX_COMMENT_CHARS} characters"
            )));
        }

        if self.posts.get(post_id).await?.is_none() {
            return Err(PostError::NotFound);
        }

        let comment = Comment {
            id: self.ids.next_id(),
            post_id: post_id.to_string(),
            user_id: user_id.to_string(),
            content,
            created_at: self.clock.now(),
        };
        self.comments.insert(&comment).await?;
        self.adjust(post_id, PostCounter::Comments, 1).await?;
        self.cache.invalidate(&post_invalidation(post_id)).await;

        tracing::info!(post_id = %post_id, comment_id = %comment.id, "Comment added");
        Ok(comment)
    }

    /// Newest comments on a post, authors resolved with one batched lookup.
    ///
    /// # Errors
    ///
    /// [`PostError::Store`] if the comments cannot be read.
    pub async fn comments(&self, post_id: &str) -> Result<Vec<CommentView>> {
        let comments = self.comments.latest_for_post(post_id, COMMENTS_PAGE).await?;
        if comments.is_empty() {
            return Ok(Vec::new());
        }

        let author_ids: Vec<String> = comments.iter().map(|c| c.user_id.clone()).collect();
        let authors = self.feed.authors(&author_ids).await;

        Ok(comments
            .into_iter()
            .map(|comment| {
                let user = authors
                    .get(&comment.user_id)
                    .cloned()
                    .unwrap_or_else(|| UserSummary::unknown(comment.user_id.clone()));
                CommentView { comment, user }
            })
            .collect())
    }

    async fn adjust(&self, post_id: &str, counter: PostCounter, delta: i64) -> Result<i64> {
        self.posts
            .adjust_counter(post_id, counter, delta)
            .await?
            .ok_or(PostError::NotFound)
    }
}

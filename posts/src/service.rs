//! Post lifecycle: create, read, list and delete.
//!
//! Reads go through the cache; writes invalidate the item key and the whole
//! `posts` listing namespace before returning, so a read issued after a write
//! completes never sees the pre-write state. Lifecycle events are published
//! after the store write. A publish failure is logged and does not undo the
//! write.

use crate::error::{PostError, Result};
use crate::feed::{FeedPage, FeedPost, FeedReader};
use agora_cache::CacheAside;
use agora_core::cache::{CacheKey, Invalidation, Namespace};
use agora_core::environment::{Clock, IdGenerator};
use agora_core::event_bus::{EventBus, publish_event};
use agora_core::events::{PostCreated, PostDeleted, PostEvent};
use agora_core::model::{PageRequest, Post};
use agora_core::store::PostStore;
use serde::Deserialize;
use std::sync::Arc;

/// Longest post body, in characters, after trimming.
pub const MAX_CONTENT_CHARS: usize = 5000;

/// Most media a post may reference.
pub const MAX_MEDIA: usize = 10;

/// Cache entity name for posts.
pub(crate) const ENTITY: &str = "post";

/// Input of [`PostService::create`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewPost {
    /// Body text
    pub content: String,
    /// Media uploaded beforehand
    #[serde(alias = "mediaIDs")]
    pub media_ids: Vec<String>,
}

/// Everything a post write declares stale.
pub(crate) fn post_invalidation(post_id: &str) -> Invalidation {
    Invalidation::new()
        .key(CacheKey::item(ENTITY, post_id))
        .namespace(Namespace::listings_of(ENTITY))
}

/// Post operations over injected adapters.
#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostStore>,
    bus: Arc<dyn EventBus>,
    cache: CacheAside,
    feed: FeedReader,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl PostService {
    /// Build the service.
    #[must_use]
    pub fn new(
        posts: Arc<dyn PostStore>,
        bus: Arc<dyn EventBus>,
        cache: CacheAside,
        feed: FeedReader,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            posts,
            bus,
            cache,
            feed,
            clock,
            ids,
        }
    }

    /// Persist a post, invalidate listings and publish `post.created`.
    ///
    /// # Errors
    ///
    /// [`PostError::Validation`] for bad input, [`PostError::Store`] if the
    /// write fails.
    pub async fn create(&self, author_id: &str, input: NewPost) -> Result<Post> {
        let content = input.content.trim().to_string();
        validate(&content, &input.media_ids)?;

        let post = Post {
            id: self.ids.next_id(),
            author_id: author_id.to_string(),
            content,
            media_ids: input.media_ids,
            like_count: 0,
            comment_count: 0,
            created_at: self.clock.now(),
        };
        self.posts.insert(&post).await?;
        self.cache.invalidate(&post_invalidation(&post.id)).await;

        self.publish(PostEvent::Created(PostCreated {
            post_id: post.id.clone(),
            user_id: post.author_id.clone(),
            content: post.content.clone(),
            created_at: post.created_at,
        }))
        .await;

        tracing::info!(post_id = %post.id, author_id = %post.author_id, media = post.media_ids.len(), "Post created");
        Ok(post)
    }

    /// One post with author and media resolved.
    ///
    /// # Errors
    ///
    /// [`PostError::NotFound`] if no such post exists.
    pub async fn get(&self, id: &str) -> Result<FeedPost> {
        let key = CacheKey::item(ENTITY, id);
        if let Some(cached) = self.cache.get::<FeedPost>(&key).await {
            tracing::debug!(post_id = %id, "Serving post from cache");
            return Ok(cached);
        }

        let post = self.posts.get(id).await?.ok_or(PostError::NotFound)?;
        let mut enriched = self.feed.enrich(vec![post]).await;
        let found = enriched.posts.pop().ok_or(PostError::NotFound)?;

        if enriched.degraded {
            tracing::debug!(post_id = %id, "Not caching degraded post");
        } else {
            self.cache.put(&key, &found).await;
        }
        Ok(found)
    }

    /// A page of the feed, newest first. A page degraded by a peer failure
    /// is returned but not cached.
    ///
    /// # Errors
    ///
    /// [`PostError::Store`] if the page or the count cannot be read.
    pub async fn list(&self, page: PageRequest) -> Result<FeedPage> {
        let key = CacheKey::listing(ENTITY, page.page, page.limit);
        if let Some(cached) = self.cache.get::<FeedPage>(&key).await {
            tracing::debug!(page = page.page, limit = page.limit, "Serving posts from cache");
            return Ok(cached);
        }

        let (rows, total_posts) = futures::try_join!(self.posts.page(page), self.posts.count())?;
        let enriched = self.feed.enrich(rows).await;
        let feed = FeedPage {
            page: page.page,
            limit: page.limit,
            total_posts,
            posts: enriched.posts,
        };

        if enriched.degraded {
            tracing::debug!(page = page.page, limit = page.limit, "Not caching degraded page");
        } else {
            self.cache.put(&key, &feed).await;
        }
        Ok(feed)
    }

    /// Delete a post owned by `user_id` and publish `post.deleted` with its
    /// media ids.
    ///
    /// # Errors
    ///
    /// [`PostError::NotFound`] if it does not exist, [`PostError::Forbidden`]
    /// if `user_id` is not the author.
    pub async fn delete(&self, id: &str, user_id: &str) -> Result<Post> {
        let existing = self.posts.get(id).await?.ok_or(PostError::NotFound)?;
        if existing.author_id != user_id {
            tracing::warn!(post_id = %id, user_id = %user_id, "Delete rejected, not the author");
            return Err(PostError::Forbidden);
        }

        let deleted = self.posts.delete(id).await?.ok_or(PostError::NotFound)?;
        self.cache.invalidate(&post_invalidation(id)).await;

        self.publish(PostEvent::Deleted(PostDeleted {
            post_id: deleted.id.clone(),
            user_id: user_id.to_string(),
            media_ids: deleted.media_ids.clone(),
        }))
        .await;

        tracing::info!(post_id = %id, media = deleted.media_ids.len(), "Post deleted");
        Ok(deleted)
    }

    async fn publish(&self, event: PostEvent) {
        let routing_key = event.routing_key();
        match publish_event(self.bus.as_ref(), &event).await {
            Ok(message_id) => {
                tracing::debug!(routing_key = %routing_key, post_id = %event.post_id(), message_id = %message_id, "Event published");
                metrics::counter!("agora_events_published_total", "routing_key" => routing_key.as_str()).increment(1);
            }
            Err(e) => {
                tracing::error!(routing_key = %routing_key, post_id = %event.post_id(), error = %e, "Failed to publish event");
                metrics::counter!("agora_events_publish_failed_total", "routing_key" => routing_key.as_str()).increment(1);
            }
        }
    }
}

fn validate(content: &str, media_ids: &[String]) -> Result<()> {
    let length = content.chars().count();
    if length == 0 {
        return Err(PostError::Validation("Content is required".to_string()));
    }
    if length > MAX_CONTENT_CHARS {
        return Err(PostError::Validation(format!(
            "Content must be at most {MAX_CONTENT_CHARS} characters"
        )));
    }
    if media_ids.len() > MAX_MEDIA {
        return Err(PostError::Validation(format!(
            "At most {MAX_MEDIA} media per post"
        )));
    }
    if media_ids.iter().any(|id| id.trim().is_empty()) {
        return Err(PostError::Validation("Media ids must not be blank".to_string()));
    }
    Ok(())
}

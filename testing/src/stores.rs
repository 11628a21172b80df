//! In-memory store adapters.
//!
//! Each store can be switched into an outage with `set_available(false)`, after
//! which every call fails with [`StoreError::Unavailable`].

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use agora_core::model::{
    Comment, Like, Media, PageRequest, Post, PostCounter, RefreshToken, SearchIndexEntry, User,
};
use agora_core::store::{
    BlobError, BlobStore, CommentStore, LikeStore, MediaStore, PostStore, RefreshTokenStore,
    Result, SearchIndex, StoreError, StoredBlob, UserStore,
};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Clone, Debug)]
struct Outage(Arc<AtomicBool>);

impl Default for Outage {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }
}

impl Outage {
    fn set_available(&self, available: bool) {
        self.0.store(!available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.0.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

macro_rules! outage_switch {
    ($store:ty) => {
        impl $store {
            /// Simulate an outage (`false`) or recovery (`true`).
            pub fn set_available(&self, available: bool) {
                self.outage.set_available(available);
            }
        }
    };
}

/// In-memory [`UserStore`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<Vec<User>>>,
    outage: Outage,
}

impl InMemoryUserStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.read().unwrap().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

outage_switch!(InMemoryUserStore);

impl UserStore for InMemoryUserStore {
    fn insert<'a>(&'a self, user: &'a User) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.outage.check()?;
            let mut users = self.users.write().unwrap();
            if users.iter().any(|u| u.username == user.username) {
                return Err(StoreError::AlreadyExists("username".to_string()));
            }
            if users.iter().any(|u| u.email == user.email) {
                return Err(StoreError::AlreadyExists("email".to_string()));
            }
            users.push(user.clone());
            Ok(())
        })
    }

    fn find_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<Option<User>>> {
        Box::pin(async move {
            self.outage.check()?;
            let users = self.users.read().unwrap();
            Ok(users.iter().find(|u| u.email == email).cloned())
        })
    }

    fn find_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<User>>> {
        Box::pin(async move {
            self.outage.check()?;
            let users = self.users.read().unwrap();
            Ok(users.iter().find(|u| u.id == id).cloned())
        })
    }

    fn find_many<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Result<Vec<User>>> {
        Box::pin(async move {
            self.outage.check()?;
            let users = self.users.read().unwrap();
            Ok(users.iter().filter(|u| ids.contains(&u.id)).cloned().collect())
        })
    }
}

/// In-memory [`RefreshTokenStore`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryRefreshTokenStore {
    tokens: Arc<RwLock<HashMap<String, RefreshToken>>>,
    outage: Outage,
}

impl InMemoryRefreshTokenStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `token` is currently stored.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.tokens.read().unwrap().contains_key(token)
    }

    /// Number of stored tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.read().unwrap().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

outage_switch!(InMemoryRefreshTokenStore);

impl RefreshTokenStore for InMemoryRefreshTokenStore {
    fn insert<'a>(&'a self, token: &'a RefreshToken) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.outage.check()?;
            self.tokens
                .write()
                .unwrap()
                .insert(token.token.clone(), token.clone());
            Ok(())
        })
    }

    fn consume<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<Option<RefreshToken>>> {
        Box::pin(async move {
            self.outage.check()?;
            Ok(self.tokens.write().unwrap().remove(token))
        })
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            self.outage.check()?;
            let mut tokens = self.tokens.write().unwrap();
            let before = tokens.len();
            tokens.retain(|_, t| !t.is_expired(now));
            Ok((before - tokens.len()) as u64)
        })
    }
}

/// In-memory [`PostStore`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryPostStore {
    posts: Arc<RwLock<HashMap<String, Post>>>,
    outage: Outage,
    counters: Outage,
}

impl InMemoryPostStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail only counter updates (`true`) while other calls keep working.
    pub fn fail_counter_updates(&self, failing: bool) {
        self.counters.set_available(!failing);
    }

    /// Snapshot of one post, bypassing the outage switch.
    #[must_use]
    pub fn snapshot(&self, id: &str) -> Option<Post> {
        self.posts.read().unwrap().get(id).cloned()
    }
}

outage_switch!(InMemoryPostStore);

impl PostStore for InMemoryPostStore {
    fn insert<'a>(&'a self, post: &'a Post) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.outage.check()?;
            let mut posts = self.posts.write().unwrap();
            if posts.contains_key(&post.id) {
                return Err(StoreError::AlreadyExists(post.id.clone()));
            }
            posts.insert(post.id.clone(), post.clone());
            Ok(())
        })
    }

    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Post>>> {
        Box::pin(async move {
            self.outage.check()?;
            Ok(self.posts.read().unwrap().get(id).cloned())
        })
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Post>>> {
        Box::pin(async move {
            self.outage.check()?;
            Ok(self.posts.write().unwrap().remove(id))
        })
    }

    fn page(&self, page: PageRequest) -> BoxFuture<'_, Result<Vec<Post>>> {
        Box::pin(async move {
            self.outage.check()?;
            let mut posts: Vec<Post> = self.posts.read().unwrap().values().cloned().collect();
            posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
            Ok(posts
                .into_iter()
                .skip(offset)
                .take(page.limit as usize)
                .collect())
        })
    }

    fn count(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            self.outage.check()?;
            Ok(self.posts.read().unwrap().len() as u64)
        })
    }

    fn adjust_counter<'a>(
        &'a self,
        id: &'a str,
        counter: PostCounter,
        delta: i64,
    ) -> BoxFuture<'a, Result<Option<i64>>> {
        Box::pin(async move {
            self.outage.check()?;
            self.counters.check()?;
            let mut posts = self.posts.write().unwrap();
            Ok(posts.get_mut(id).map(|post| {
                let value = match counter {
                    PostCounter::Likes => &mut post.like_count,
                    PostCounter::Comments => &mut post.comment_count,
                };
                *value = (*value + delta).max(0);
                *value
            }))
        })
    }
}

/// In-memory [`LikeStore`] enforcing `(post_id, user_id)` uniqueness.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLikeStore {
    likes: Arc<RwLock<HashSet<(String, String)>>>,
    outage: Outage,
}

impl InMemoryLikeStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Likes recorded for a post.
    #[must_use]
    pub fn count_for(&self, post_id: &str) -> usize {
        self.likes
            .read()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == post_id)
            .count()
    }
}

outage_switch!(InMemoryLikeStore);

impl LikeStore for InMemoryLikeStore {
    fn insert<'a>(&'a self, like: &'a Like) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.outage.check()?;
            let key = (like.post_id.clone(), like.user_id.clone());
            if self.likes.write().unwrap().insert(key) {
                Ok(())
            } else {
                Err(StoreError::AlreadyExists("like".to_string()))
            }
        })
    }

    fn remove<'a>(&'a self, post_id: &'a str, user_id: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            self.outage.check()?;
            Ok(self
                .likes
                .write()
                .unwrap()
                .remove(&(post_id.to_string(), user_id.to_string())))
        })
    }
}

/// In-memory [`CommentStore`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryCommentStore {
    comments: Arc<RwLock<Vec<Comment>>>,
    outage: Outage,
}

impl InMemoryCommentStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

outage_switch!(InMemoryCommentStore);

impl CommentStore for InMemoryCommentStore {
    fn insert<'a>(&'a self, comment: &'a Comment) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.outage.check()?;
            self.comments.write().unwrap().push(comment.clone());
            Ok(())
        })
    }

    fn latest_for_post<'a>(
        &'a self,
        post_id: &'a str,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<Comment>>> {
        Box::pin(async move {
            self.outage.check()?;
            let mut comments: Vec<Comment> = self
                .comments
                .read()
                .unwrap()
                .iter()
                .filter(|c| c.post_id == post_id)
                .cloned()
                .collect();
            comments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            comments.truncate(limit as usize);
            Ok(comments)
        })
    }
}

/// In-memory [`MediaStore`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryMediaStore {
    media: Arc<RwLock<HashMap<String, Media>>>,
    outage: Outage,
    failing_deletes: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryMediaStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a row exists, bypassing the outage switch.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.media.read().unwrap().contains_key(id)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.media.read().unwrap().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make deleting row `id` fail until cleared with `failing = false`.
    pub fn fail_delete_of(&self, id: &str, failing: bool) {
        let mut ids = self.failing_deletes.write().unwrap();
        if failing {
            ids.insert(id.to_string());
        } else {
            ids.remove(id);
        }
    }
}

outage_switch!(InMemoryMediaStore);

impl MediaStore for InMemoryMediaStore {
    fn insert<'a>(&'a self, media: &'a Media) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.outage.check()?;
            self.media
                .write()
                .unwrap()
                .insert(media.id.clone(), media.clone());
            Ok(())
        })
    }

    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Media>>> {
        Box::pin(async move {
            self.outage.check()?;
            Ok(self.media.read().unwrap().get(id).cloned())
        })
    }

    fn find_many<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Result<Vec<Media>>> {
        Box::pin(async move {
            self.outage.check()?;
            let media = self.media.read().unwrap();
            Ok(ids.iter().filter_map(|id| media.get(id).cloned()).collect())
        })
    }

    fn list_all(&self) -> BoxFuture<'_, Result<Vec<Media>>> {
        Box::pin(async move {
            self.outage.check()?;
            let mut all: Vec<Media> = self.media.read().unwrap().values().cloned().collect();
            all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(all)
        })
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            self.outage.check()?;
            if self.failing_deletes.read().unwrap().contains(id) {
                return Err(StoreError::Unavailable(format!("delete of {id} failed")));
            }
            Ok(self.media.write().unwrap().remove(id).is_some())
        })
    }
}

/// In-memory [`SearchIndex`] with naive word matching.
///
/// Ranks entries by how many query words they contain, newest first on ties.
#[derive(Clone, Debug, Default)]
pub struct InMemorySearchIndex {
    entries: Arc<RwLock<HashMap<String, SearchIndexEntry>>>,
    outage: Outage,
}

impl InMemorySearchIndex {
    /// Empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all entries, bypassing the outage switch.
    #[must_use]
    pub fn entries(&self) -> Vec<SearchIndexEntry> {
        self.entries.read().unwrap().values().cloned().collect()
    }
}

outage_switch!(InMemorySearchIndex);

impl SearchIndex for InMemorySearchIndex {
    fn upsert<'a>(&'a self, entry: &'a SearchIndexEntry) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            self.outage.check()?;
            let mut entries = self.entries.write().unwrap();
            if entries.contains_key(&entry.post_id) {
                return Ok(false);
            }
            entries.insert(entry.post_id.clone(), entry.clone());
            Ok(true)
        })
    }

    fn remove<'a>(&'a self, post_id: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            self.outage.check()?;
            Ok(self.entries.write().unwrap().remove(post_id).is_some())
        })
    }

    fn search<'a>(
        &'a self,
        query: &'a str,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<SearchIndexEntry>>> {
        Box::pin(async move {
            self.outage.check()?;
            let words: Vec<String> = query
                .split_whitespace()
                .map(str::to_lowercase)
                .collect();
            let entries = self.entries.read().unwrap();

            let mut scored: Vec<(usize, &SearchIndexEntry)> = entries
                .values()
                .map(|entry| {
                    let content = entry.content.to_lowercase();
                    let score = words.iter().filter(|w| content.contains(w.as_str())).count();
                    (score, entry)
                })
                .filter(|(score, _)| *score > 0)
                .collect();
            scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.created_at.cmp(&a.1.created_at)));

            Ok(scored
                .into_iter()
                .take(limit as usize)
                .map(|(_, entry)| entry.clone())
                .collect())
        })
    }
}

/// In-memory [`BlobStore`] with per-blob failure injection.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    failing: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryBlobStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a blob exists.
    #[must_use]
    pub fn contains(&self, public_id: &str) -> bool {
        self.blobs.read().unwrap().contains_key(public_id)
    }

    /// Number of blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().unwrap().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make deleting `public_id` fail until cleared with `failing = false`.
    pub fn fail_delete_of(&self, public_id: &str, failing: bool) {
        let mut failing_ids = self.failing.write().unwrap();
        if failing {
            failing_ids.insert(public_id.to_string());
        } else {
            failing_ids.remove(public_id);
        }
    }
}

impl BlobStore for InMemoryBlobStore {
    fn upload<'a>(
        &'a self,
        original_name: &'a str,
        _mime_type: &'a str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'a, std::result::Result<StoredBlob, BlobError>> {
        Box::pin(async move {
            let mut blobs = self.blobs.write().unwrap();
            let public_id = format!("blob-{}-{original_name}", blobs.len() + 1);
            blobs.insert(public_id.clone(), bytes);
            Ok(StoredBlob {
                url: format!("memory://{public_id}"),
                public_id,
            })
        })
    }

    fn delete<'a>(&'a self, public_id: &'a str) -> BoxFuture<'a, std::result::Result<(), BlobError>> {
        Box::pin(async move {
            if self.failing.read().unwrap().contains(public_id) {
                return Err(BlobError::Provider("provider timeout".to_string()));
            }
            match self.blobs.write().unwrap().remove(public_id) {
                Some(_) => Ok(()),
                None => Err(BlobError::NotFound(public_id.to_string())),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(post_id: &str, content: &str, minutes: i64) -> SearchIndexEntry {
        SearchIndexEntry {
            post_id: post_id.to_string(),
            user_id: "u1".to_string(),
            content: content.to_string(),
            created_at: Utc::now() + Duration::minutes(minutes),
        }
    }

    #[tokio::test]
    async fn search_ranks_by_matched_words_then_recency() {
        let index = InMemorySearchIndex::new();
        index.upsert(&entry("p1", "hello world", 0)).await.unwrap();
        index.upsert(&entry("p2", "hello there", 5)).await.unwrap();
        index.upsert(&entry("p3", "goodbye", 10)).await.unwrap();

        let hits = index.search("hello world", 10).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|e| e.post_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn like_pairs_are_unique() {
        let likes = InMemoryLikeStore::new();
        let like = Like {
            post_id: "p".to_string(),
            user_id: "u".to_string(),
            created_at: Utc::now(),
        };
        likes.insert(&like).await.unwrap();
        assert!(matches!(
            likes.insert(&like).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn counters_never_go_negative() {
        let posts = InMemoryPostStore::new();
        let post = Post {
            id: "p".to_string(),
            author_id: "u".to_string(),
            content: "c".to_string(),
            media_ids: vec![],
            like_count: 0,
            comment_count: 0,
            created_at: Utc::now(),
        };
        posts.insert(&post).await.unwrap();

        let value = posts
            .adjust_counter("p", PostCounter::Likes, -1)
            .await
            .unwrap();
        assert_eq!(value, Some(0));
        assert_eq!(
            posts.adjust_counter("missing", PostCounter::Likes, 1).await.unwrap(),
            None
        );
    }
}

//! Aggregation reader.
//!
//! Posts only store their author id and media ids. The reader resolves both
//! against the owning services in batches of at most [`MAX_LOOKUP_IDS`] ids,
//! every batch issued concurrently and bounded by a deadline. A failed or late
//! batch degrades only the ids it carried:
//!
//! ```text
//!            ┌── users_by_ids(chunk) … ──┐
//! page ──────┤                           ├── merge ──► Enriched { posts, degraded }
//!            └── media_by_ids(chunk) … ──┘
//!   user batch failed  → author: null for its ids
//!   media batch failed → its media left out
//!   unresolved media   → dropped
//! ```
//!
//! Callers must not cache a degraded result.

use agora_core::model::{Media, Post, UserSummary};
use agora_core::peers::{MAX_LOOKUP_IDS, MediaLookup, PeerError, UserLookup};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A post with its author and media resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPost {
    /// The stored post
    #[serde(flatten)]
    pub post: Post,
    /// Author, `null` when identity-service could not resolve it
    pub author: Option<UserSummary>,
    /// Media that still exist, in the order the post references them
    pub media: Vec<Media>,
}

/// One page of the enriched feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    /// Requested page
    pub page: u32,
    /// Requested page size
    pub limit: u32,
    /// Number of posts in the store
    pub total_posts: u64,
    /// Posts on this page, newest first
    pub posts: Vec<FeedPost>,
}

/// Output of [`FeedReader::enrich`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enriched {
    /// Posts in input order
    pub posts: Vec<FeedPost>,
    /// A peer batch failed or timed out
    pub degraded: bool,
}

/// Peer results merged from every batch.
struct Resolved<T> {
    found: HashMap<String, T>,
    degraded: bool,
}

/// Resolves cross-service references for pages of posts.
#[derive(Clone)]
pub struct FeedReader {
    users: Arc<dyn UserLookup>,
    media: Arc<dyn MediaLookup>,
    timeout: Duration,
}

impl FeedReader {
    /// Reader over the two peer lookups, each batch bounded by `timeout`.
    #[must_use]
    pub fn new(users: Arc<dyn UserLookup>, media: Arc<dyn MediaLookup>, timeout: Duration) -> Self {
        Self {
            users,
            media,
            timeout,
        }
    }

    /// Attach authors and media to `posts`, keeping their order.
    pub async fn enrich(&self, posts: Vec<Post>) -> Enriched {
        let author_ids = distinct(posts.iter().map(|p| p.author_id.as_str()));
        let media_ids = distinct(posts.iter().flat_map(|p| p.media_ids.iter().map(String::as_str)));

        let (authors, attachments) =
            tokio::join!(self.resolve_users(&author_ids), self.resolve_media(&media_ids));

        let posts = posts
            .into_iter()
            .map(|post| {
                let author = authors.found.get(&post.author_id).cloned();
                let media = post
                    .media_ids
                    .iter()
                    .filter_map(|id| attachments.found.get(id).cloned())
                    .collect();
                FeedPost {
                    post,
                    author,
                    media,
                }
            })
            .collect();

        Enriched {
            posts,
            degraded: authors.degraded || attachments.degraded,
        }
    }

    /// Resolve user summaries. Any id that cannot be resolved, including the
    /// ids of a failed batch, maps to the "Unknown" placeholder.
    pub async fn authors(&self, ids: &[String]) -> HashMap<String, UserSummary> {
        let ids = distinct(ids.iter().map(String::as_str));
        let mut found = self.resolve_users(&ids).await.found;
        for id in ids {
            found
                .entry(id.clone())
                .or_insert_with(|| UserSummary::unknown(id));
        }
        found
    }

    async fn resolve_users(&self, ids: &[String]) -> Resolved<UserSummary> {
        let batches = ids.chunks(MAX_LOOKUP_IDS).map(|chunk| {
            bounded("identity-service", self.timeout, self.users.users_by_ids(chunk))
        });
        merge(join_all(batches).await)
    }

    async fn resolve_media(&self, ids: &[String]) -> Resolved<Media> {
        let batches = ids.chunks(MAX_LOOKUP_IDS).map(|chunk| {
            bounded("media-service", self.timeout, self.media.media_by_ids(chunk))
        });
        merge(join_all(batches).await)
    }
}

fn merge<T>(batches: Vec<Option<HashMap<String, T>>>) -> Resolved<T> {
    let mut resolved = Resolved {
        found: HashMap::new(),
        degraded: false,
    };
    for batch in batches {
        match batch {
            Some(found) => resolved.found.extend(found),
            None => resolved.degraded = true,
        }
    }
    resolved
}

/// Run a peer lookup under a deadline. A timeout is handled like any other
/// peer failure: logged, counted and turned into `None`.
async fn bounded<T>(
    peer: &str,
    timeout: Duration,
    lookup: impl Future<Output = Result<T, PeerError>>,
) -> Option<T> {
    let error = match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(found)) => return Some(found),
        Ok(Err(e)) => e,
        Err(_) => PeerError::Timeout {
            peer: peer.to_string(),
        },
    };
    tracing::warn!(peer = %peer, error = %error, "Peer lookup failed, degrading response");
    metrics::counter!("agora_peer_lookup_failures_total", "peer" => peer.to_string()).increment(1);
    None
}

fn distinct<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    ids.filter(|id| !id.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(ToString::to_string)
        .collect()
}

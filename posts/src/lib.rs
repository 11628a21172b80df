//! Agora post service.
//!
//! System of record for posts, likes and comments. Publishes the post
//! lifecycle (`post.created`, `post.deleted`) that media-service and
//! search-service project from, and serves a feed enriched with data owned by
//! identity-service and media-service.
//!
//! - [`service`]: create, read, list, delete, with cache-aside reads
//! - [`feed`]: the aggregation reader fanning out to peers
//! - [`interactions`]: like toggle and comments
//! - [`peers`]: HTTP clients for the batched peer lookups

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod feed;
pub mod handlers;
pub mod interactions;
pub mod peers;
pub mod service;

pub use error::PostError;
pub use feed::{FeedPage, FeedPost, FeedReader};
pub use handlers::{AppState, router};
pub use interactions::Interactions;
pub use service::PostService;

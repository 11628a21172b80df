//! Agora search service.
//!
//! The index is a derived store: entries are created from `post.created`,
//! removed on `post.deleted`, and never written any other way. Queries go
//! through `GET /api/search/posts?query=`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod handlers;
pub mod projection;
pub mod service;

pub use handlers::router;
pub use projection::SearchProjection;
pub use service::{SearchError, SearchService};

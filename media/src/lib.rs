//! Agora media service.
//!
//! Owns uploaded media: the blob in the provider and the row describing it.
//! Rows are created by uploads and removed when the owning post's
//! `post.deleted` event is consumed.
//!
//! | Route | Auth | Purpose |
//! |---|---|---|
//! | `POST /api/media/upload` | `x-user-id` | multipart field `file` |
//! | `GET /api/media/get-media[?ids=a,b]` | none | batched lookup for peers |
//! | `GET /files/<publicId>` | none | blob contents |
//! | `GET /health` | none | liveness |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod blob;
pub mod cleanup;
pub mod config;
pub mod handlers;
pub mod service;

pub use blob::FilesystemBlobStore;
pub use cleanup::MediaCleanupProjection;
pub use handlers::router;
pub use service::{MediaError, MediaService, Upload};

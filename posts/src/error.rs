//! Errors of the post service and their HTTP mapping.

use agora_core::store::StoreError;
use agora_web::AppError;
use thiserror::Error;

/// Errors returned by post and interaction operations.
#[derive(Error, Debug)]
pub enum PostError {
    /// Input rejected before any write
    #[error("{0}")]
    Validation(String),

    /// No post with that id
    #[error("Post not found")]
    NotFound,

    /// Caller is not the author
    #[error("Only the author can delete a post")]
    Forbidden,

    /// Store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for post operations.
pub type Result<T> = std::result::Result<T, PostError>;

impl From<PostError> for AppError {
    fn from(err: PostError) -> Self {
        match err {
            PostError::Validation(message) => Self::bad_request(message),
            PostError::NotFound => Self::not_found("Post not found"),
            PostError::Forbidden => Self::forbidden("Only the author can delete a post"),
            PostError::Store(e) => Self::internal().with_source(e),
        }
    }
}

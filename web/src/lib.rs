//! Shared Axum plumbing for the Agora services.
//!
//! Every backend service and the gateway build their routers from the same
//! pieces:
//!
//! - [`AppError`]: maps failures to `{ success: false, message, code }` with the
//!   right status, logging the internal cause for 5xx only
//! - [`ApiResponse`]: the `{ success: true, ... }` envelope
//! - [`AuthenticatedUser`]: the identity the gateway forwarded in `x-user-id`
//! - [`Json`] and [`Query`]: input extractors whose rejections use the error
//!   envelope
//! - [`correlation_id_layer`]: correlation ids and request logging
//! - [`server`]: tracing setup, health route, graceful shutdown
//!
//! # Example
//!
//! ```ignore
//! use agora_web::{ApiResponse, AppError, AuthenticatedUser, correlation_id_layer};
//! use axum::{Router, routing::get};
//!
//! async fn whoami(user: AuthenticatedUser) -> Result<ApiResponse<Me>, AppError> {
//!     Ok(ApiResponse::ok(Me { id: user.0 }))
//! }
//!
//! let app = Router::new()
//!     .route("/api/me", get(whoami))
//!     .layer(correlation_id_layer());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod response;
pub mod server;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{AuthenticatedUser, Json, Query};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use response::ApiResponse;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

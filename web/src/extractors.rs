//! Custom Axum extractors.
//!
//! - `AuthenticatedUser`: the subject the gateway verified, from `x-user-id`
//! - `Json` / `Query`: axum's extractors with rejections turned into
//!   [`AppError`], so malformed input gets the usual error envelope
//!
//! # Examples
//!
//! ```ignore
//! async fn handler(
//!     AuthenticatedUser(user_id): AuthenticatedUser,
//!     Json(input): Json<NewPost>,
//! ) -> Result<ApiResponse<Created>, AppError> {
//!     ...
//! }
//! ```

use crate::error::AppError;
use agora_core::USER_ID_HEADER;
use axum::{
    async_trait,
    extract::{
        ConnectInfo, FromRequest, FromRequestParts,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode, request::Parts},
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// JSON request body. A rejection becomes a 400 (413 when over the body
/// limit) with the error envelope.
#[derive(Debug, Clone, Copy, Default, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Json<T>(pub T);

/// Query string. A rejection becomes a 400 with the error envelope.
#[derive(Debug, Clone, Copy, Default, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct Query<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::payload_too_large("Request body too large")
        } else {
            Self::bad_request(rejection.body_text())
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

/// The user id the gateway injected after verifying the bearer token.
///
/// Backend services trust this header unconditionally; requests without it
/// are rejected with 401 on routes that take this extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| Self(id.to_string()))
            .ok_or_else(|| AppError::unauthorized("Authentication required"))
    }
}

/// Resolve the caller's address.
///
/// With `trust_forwarded`, the first `X-Forwarded-For` entry wins, then
/// `X-Real-IP`. Otherwise only the socket address is used. Falls back to
/// loopback when nothing is known.
#[must_use]
pub fn client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_forwarded: bool,
) -> IpAddr {
    if trust_forwarded {
        let forwarded = headers
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip;
        }

        let real_ip = headers
            .get("X-Real-IP")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<IpAddr>().ok());
        if let Some(ip) = real_ip {
            return ip;
        }
    }

    connect_info.map_or(IpAddr::V4(Ipv4Addr::LOCALHOST), |info| info.0.ip())
}

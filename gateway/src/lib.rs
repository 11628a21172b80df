//! Agora API gateway.
//!
//! The only trust boundary in the system. Every request except `GET /health`
//! passes through:
//!
//! ```text
//! client ──► rate limit (shared counter, per IP) ──► 429
//!               │
//!               ▼
//!            route by /v1/<prefix> ──────────────────► 404
//!               │
//!               ▼
//!            bearer token (all prefixes but auth) ───► 401, nothing forwarded
//!               │
//!               ▼
//!            upstream /api/<prefix>/… with x-user-id ► 502 if unreachable
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod config;
pub mod proxy;
pub mod rate_limit;

use agora_web::{AppError, correlation_id_layer, extractors::client_ip, server::health_routes};
use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

pub use auth::Authenticator;
pub use proxy::Proxy;
pub use rate_limit::{Decision, RateLimiter};

/// Everything the gateway handlers share.
#[derive(Clone)]
pub struct GatewayState {
    /// Token verification
    pub auth: Authenticator,
    /// Shared rate limiter
    pub limiter: RateLimiter,
    /// Upstream routing
    pub proxy: Arc<Proxy>,
    /// Take the client IP from forwarding headers
    pub trust_forwarded_for: bool,
}

/// Build the gateway router. `/health` skips rate limiting and auth.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .fallback(proxy_request)
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .with_state(state)
        .merge(health_routes("api-gateway"))
        .layer(correlation_id_layer())
}

async fn rate_limit(State(state): State<GatewayState>, request: Request<Body>, next: Next) -> Response {
    let ip = client_ip(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
        state.trust_forwarded_for,
    );
    if state.limiter.check(ip).await.is_allowed() {
        next.run(request).await
    } else {
        AppError::too_many_requests().into_response()
    }
}

async fn proxy_request(
    State(state): State<GatewayState>,
    request: Request<Body>,
) -> Result<Response, AppError> {
    let upstream = state
        .proxy
        .upstream_for(request.uri().path())
        .ok_or_else(|| AppError::not_found("Route not found"))?;

    let subject = if upstream.requires_auth {
        let claims = state.auth.authenticate(request.headers())?;
        tracing::debug!(user_id = %claims.user_id, upstream = upstream.name, "Request authenticated");
        Some(claims.user_id)
    } else {
        None
    };

    state.proxy.forward(upstream, request, subject.as_deref()).await
}

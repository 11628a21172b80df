//! Bearer token verification at the edge.

use agora_core::token::{AccessClaims, TokenError, TokenSigner};
use agora_web::AppError;
use axum::http::{HeaderMap, header};

/// Token from `Authorization: Bearer <token>`, if the header has that shape.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Verifies access tokens issued by identity-service.
#[derive(Debug, Clone)]
pub struct Authenticator {
    signer: TokenSigner,
}

impl Authenticator {
    /// Verify with `signer`.
    #[must_use]
    pub fn new(signer: TokenSigner) -> Self {
        Self { signer }
    }

    /// Claims of the request's bearer token.
    ///
    /// # Errors
    ///
    /// 401 when the header is missing, malformed, expired or badly signed.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AccessClaims, AppError> {
        let token = bearer_token(headers).ok_or_else(|| {
            tracing::debug!("Request without bearer token");
            AppError::unauthorized("Authentication required")
        })?;

        self.signer.verify(token).map_err(|e| {
            let reason = match e {
                TokenError::Expired => "expired",
                TokenError::Invalid(_) | TokenError::Signing(_) => "invalid",
            };
            tracing::warn!(reason, "Token verification failed");
            metrics::counter!("agora_gateway_auth_failures_total", "reason" => reason).increment(1);
            AppError::unauthorized("Invalid or expired token")
        })
    }
}

//! Configuration for the gateway.

use agora_web::config::{ConfigError, ServerConfig, env_list, env_or, env_parse, env_secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gateway configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP bind address
    pub server: ServerConfig,
    /// HS256 secret shared with identity-service (`JWT_SECRET`, required)
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    /// Redis URL for the shared rate-limit counters (`REDIS_URL`)
    pub redis_url: String,
    /// Deadline for Redis connects and commands in milliseconds (`REDIS_TIMEOUT_MS`)
    pub redis_timeout_ms: u64,
    /// Rate limiting
    pub rate_limit: RateLimitConfig,
    /// Backend base URLs
    pub upstreams: UpstreamConfig,
    /// Deadline for one proxied call in milliseconds (`UPSTREAM_TIMEOUT_MS`)
    pub upstream_timeout_ms: u64,
    /// Largest request body forwarded (`MAX_BODY_BYTES`)
    pub max_body_bytes: usize,
}

/// Fixed-window limit per client IP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window (`RATE_LIMIT_MAX`)
    pub max_requests: u64,
    /// Window length in seconds (`RATE_LIMIT_WINDOW_SECS`)
    pub window_secs: u64,
    /// CIDRs that are never limited (`HEALTH_CHECK_CIDRS`, comma-separated)
    pub health_check_cidrs: Vec<String>,
    /// Take the client IP from `X-Forwarded-For` (`TRUST_FORWARDED_FOR`)
    pub trust_forwarded_for: bool,
}

impl RateLimitConfig {
    /// Window as a [`Duration`].
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Base URL of each backend service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// `IDENTITY_SERVICE_URL`
    pub identity: String,
    /// `POST_SERVICE_URL`
    pub posts: String,
    /// `MEDIA_SERVICE_URL`
    pub media: String,
    /// `SEARCH_SERVICE_URL`
    pub search: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Missing`] if `JWT_SECRET` is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_env(3000),
            jwt_secret: env_secret("JWT_SECRET")?,
            redis_url: env_or("REDIS_URL", "redis://localhost:6379"),
            redis_timeout_ms: env_parse("REDIS_TIMEOUT_MS", 250),
            rate_limit: RateLimitConfig {
                max_requests: env_parse("RATE_LIMIT_MAX", 100),
                window_secs: env_parse("RATE_LIMIT_WINDOW_SECS", 900),
                health_check_cidrs: env_list("HEALTH_CHECK_CIDRS", ""),
                trust_forwarded_for: env_parse("TRUST_FORWARDED_FOR", false),
            },
            upstreams: UpstreamConfig {
                identity: env_or("IDENTITY_SERVICE_URL", "http://localhost:3001"),
                posts: env_or("POST_SERVICE_URL", "http://localhost:3002"),
                media: env_or("MEDIA_SERVICE_URL", "http://localhost:3003"),
                search: env_or("SEARCH_SERVICE_URL", "http://localhost:3004"),
            },
            upstream_timeout_ms: env_parse("UPSTREAM_TIMEOUT_MS", 10_000),
            max_body_bytes: env_parse("MAX_BODY_BYTES", 6 * 1024 * 1024),
        })
    }

    /// Redis deadline as a [`Duration`].
    #[must_use]
    pub const fn redis_timeout(&self) -> Duration {
        Duration::from_millis(self.redis_timeout_ms)
    }

    /// Upstream deadline as a [`Duration`].
    #[must_use]
    pub const fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }
}

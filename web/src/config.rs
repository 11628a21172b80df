//! Environment helpers shared by every service's `Config::from_env`.
//!
//! Missing or unparsable values fall back to the local-development default,
//! except secrets, which have none.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// A required variable is missing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Unset or blank
    #[error("{0} must be set")]
    Missing(String),
}

/// Secret variable with no default. Blank counts as unset.
///
/// # Errors
///
/// [`ConfigError::Missing`] when the variable is unset or blank.
pub fn env_secret(key: &str) -> Result<String, ConfigError> {
    secret(key, env::var(key).ok())
}

/// Validate a secret read from `key`.
///
/// # Errors
///
/// [`ConfigError::Missing`] when `value` is absent or blank.
pub fn secret(key: &str, value: Option<String>) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::Missing(key.to_string()))
}

/// String variable with a default.
#[must_use]
pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parsed variable with a default.
#[must_use]
pub fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Comma-separated list variable, empty entries skipped.
#[must_use]
pub fn env_list(key: &str, default: &str) -> Vec<String> {
    env_or(key, default)
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Bind address of an HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to (`HOST`)
    pub host: String,
    /// Port to bind to (`PORT`)
    pub port: u16,
}

impl ServerConfig {
    /// Read `HOST` and `PORT`.
    #[must_use]
    pub fn from_env(default_port: u16) -> Self {
        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse("PORT", default_port),
        }
    }

    /// `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Event bus connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    /// Broker addresses (`KAFKA_BROKERS`, comma-separated)
    pub brokers: String,
    /// Shared topic (`EVENT_TOPIC`)
    pub topic: String,
}

impl EventBusConfig {
    /// Read `KAFKA_BROKERS` and `EVENT_TOPIC`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            brokers: env_or("KAFKA_BROKERS", "localhost:9092"),
            topic: env_or("EVENT_TOPIC", "social-events"),
        }
    }
}

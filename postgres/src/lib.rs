//! `PostgreSQL` store adapters for the Agora services.
//!
//! Every service owns its own database. This crate provides the `sqlx`
//! implementations of the per-service store traits from `agora-core` together
//! with the migrations each service applies at startup:
//!
//! | Service  | Adapters                                         | Migrations            |
//! |----------|--------------------------------------------------|-----------------------|
//! | identity | [`PgUserStore`], [`PgRefreshTokenStore`]         | `migrations/identity` |
//! | posts    | [`PgPostStore`], [`PgLikeStore`], [`PgCommentStore`] | `migrations/posts` |
//! | media    | [`PgMediaStore`]                                 | `migrations/media`    |
//! | search   | [`PgSearchIndex`]                                | `migrations/search`   |
//!
//! # Example
//!
//! ```ignore
//! use agora_postgres::{Schema, connect};
//!
//! let pool = connect("postgres://localhost/posts", 10).await?;
//! Schema::Posts.migrate(&pool).await?;
//! let posts = PgPostStore::new(pool);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod identity;
mod media;
mod posts;
mod search;

pub use identity::{PgRefreshTokenStore, PgUserStore};
pub use media::PgMediaStore;
pub use posts::{PgCommentStore, PgLikeStore, PgPostStore};
pub use search::PgSearchIndex;

use agora_core::store::StoreError;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

static IDENTITY_MIGRATIONS: Migrator = sqlx::migrate!("./migrations/identity");
static POSTS_MIGRATIONS: Migrator = sqlx::migrate!("./migrations/posts");
static MEDIA_MIGRATIONS: Migrator = sqlx::migrate!("./migrations/media");
static SEARCH_MIGRATIONS: Migrator = sqlx::migrate!("./migrations/search");

/// Connect a pool with a bounded acquire timeout.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] if the database cannot be reached.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .map_err(|e| StoreError::Unavailable(format!("Failed to connect: {e}")))?;

    tracing::info!(max_connections, "Connected to PostgreSQL");
    Ok(pool)
}

/// The schema owned by one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// Users and refresh tokens
    Identity,
    /// Posts, likes and comments
    Posts,
    /// Media rows
    Media,
    /// Search index entries
    Search,
}

impl Schema {
    /// Apply the schema's pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if a migration fails.
    pub async fn migrate(self, pool: &PgPool) -> Result<(), StoreError> {
        let migrator = match self {
            Self::Identity => &IDENTITY_MIGRATIONS,
            Self::Posts => &POSTS_MIGRATIONS,
            Self::Media => &MEDIA_MIGRATIONS,
            Self::Search => &SEARCH_MIGRATIONS,
        };
        migrator
            .run(pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Migration failed: {e}")))?;

        tracing::info!(schema = ?self, "Migrations applied");
        Ok(())
    }
}

/// Translate a `sqlx` error, surfacing unique violations as
/// [`StoreError::AlreadyExists`] named after the violated constraint.
pub(crate) fn store_error(context: &str, error: &sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = error {
        if db.is_unique_violation() {
            return StoreError::AlreadyExists(db.constraint().unwrap_or(context).to_string());
        }
    }
    StoreError::Unavailable(format!("{context}: {error}"))
}

/// Row counts come back as `i64`.
pub(crate) fn to_u64(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative count {value}")))
}

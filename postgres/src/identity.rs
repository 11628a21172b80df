//! Users and refresh tokens.

use crate::store_error;
use agora_core::model::{RefreshToken, User};
use agora_core::store::{RefreshTokenStore, Result, StoreError, UserStore};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::PgPool;

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    username: String,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            created_at: row.created_at,
        }
    }
}

/// `PostgreSQL` [`UserStore`].
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Wrap a pool connected to the identity database.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl UserStore for PgUserStore {
    fn insert<'a>(&'a self, user: &'a User) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO users (id, username, email, password_hash, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(&user.id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| match store_error("insert user", &e) {
                StoreError::AlreadyExists(constraint) if constraint.contains("username") => {
                    StoreError::AlreadyExists("username".to_string())
                }
                StoreError::AlreadyExists(_) => StoreError::AlreadyExists("email".to_string()),
                other => other,
            })?;
            Ok(())
        })
    }

    fn find_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<Option<User>>> {
        Box::pin(async move {
            let row: Option<UserRow> = sqlx::query_as(
                "SELECT id, username, email, password_hash, created_at FROM users WHERE email = $1",
            )
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("find user by email", &e))?;
            Ok(row.map(User::from))
        })
    }

    fn find_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<User>>> {
        Box::pin(async move {
            let row: Option<UserRow> = sqlx::query_as(
                "SELECT id, username, email, password_hash, created_at FROM users WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("find user by id", &e))?;
            Ok(row.map(User::from))
        })
    }

    fn find_many<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Result<Vec<User>>> {
        Box::pin(async move {
            let rows: Vec<UserRow> = sqlx::query_as(
                "SELECT id, username, email, password_hash, created_at FROM users WHERE id = ANY($1)",
            )
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("find users", &e))?;
            Ok(rows.into_iter().map(User::from).collect())
        })
    }
}

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    token: String,
    user_id: String,
    expires_at: DateTime<Utc>,
}

/// `PostgreSQL` [`RefreshTokenStore`].
#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    /// Wrap a pool connected to the identity database.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl RefreshTokenStore for PgRefreshTokenStore {
    fn insert<'a>(&'a self, token: &'a RefreshToken) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            sqlx::query("INSERT INTO refresh_tokens (token, user_id, expires_at) VALUES ($1, $2, $3)")
                .bind(&token.token)
                .bind(&token.user_id)
                .bind(token.expires_at)
                .execute(&self.pool)
                .await
                .map_err(|e| store_error("insert refresh token", &e))?;
            Ok(())
        })
    }

    fn consume<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<Option<RefreshToken>>> {
        Box::pin(async move {
            // DELETE ... RETURNING makes the read and the removal one statement
            let row: Option<RefreshTokenRow> = sqlx::query_as(
                "DELETE FROM refresh_tokens WHERE token = $1 RETURNING token, user_id, expires_at",
            )
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("consume refresh token", &e))?;

            Ok(row.map(|row| RefreshToken {
                token: row.token,
                user_id: row.user_id,
                expires_at: row.expires_at,
            }))
        })
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(|e| store_error("purge refresh tokens", &e))?;
            Ok(result.rows_affected())
        })
    }
}

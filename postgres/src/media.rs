//! Media rows.

use crate::store_error;
use agora_core::model::Media;
use agora_core::store::{MediaStore, Result};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::PgPool;

#[derive(sqlx::FromRow)]
struct MediaRow {
    id: String,
    public_id: String,
    original_name: String,
    mime_type: String,
    url: String,
    owner_user_id: String,
    created_at: DateTime<Utc>,
}

impl From<MediaRow> for Media {
    fn from(row: MediaRow) -> Self {
        Self {
            id: row.id,
            public_id: row.public_id,
            original_name: row.original_name,
            mime_type: row.mime_type,
            url: row.url,
            owner_user_id: row.owner_user_id,
            created_at: row.created_at,
        }
    }
}

/// `PostgreSQL` [`MediaStore`].
#[derive(Clone)]
pub struct PgMediaStore {
    pool: PgPool,
}

impl PgMediaStore {
    /// Wrap a pool connected to the media database.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl MediaStore for PgMediaStore {
    fn insert<'a>(&'a self, media: &'a Media) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO media (id, public_id, original_name, mime_type, url, owner_user_id, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(&media.id)
            .bind(&media.public_id)
            .bind(&media.original_name)
            .bind(&media.mime_type)
            .bind(&media.url)
            .bind(&media.owner_user_id)
            .bind(media.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("insert media", &e))?;
            Ok(())
        })
    }

    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Media>>> {
        Box::pin(async move {
            let row: Option<MediaRow> = sqlx::query_as(
                "SELECT id, public_id, original_name, mime_type, url, owner_user_id, created_at FROM media WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("get media", &e))?;
            Ok(row.map(Media::from))
        })
    }

    fn find_many<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Result<Vec<Media>>> {
        Box::pin(async move {
            let rows: Vec<MediaRow> = sqlx::query_as(
                "SELECT id, public_id, original_name, mime_type, url, owner_user_id, created_at FROM media WHERE id = ANY($1)",
            )
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("find media", &e))?;
            Ok(rows.into_iter().map(Media::from).collect())
        })
    }

    fn list_all(&self) -> BoxFuture<'_, Result<Vec<Media>>> {
        Box::pin(async move {
            let rows: Vec<MediaRow> = sqlx::query_as(
                "SELECT id, public_id, original_name, mime_type, url, owner_user_id, created_at FROM media ORDER BY created_at DESC",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("list media", &e))?;
            Ok(rows.into_iter().map(Media::from).collect())
        })
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM media WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| store_error("delete media", &e))?;
            Ok(result.rows_affected() > 0)
        })
    }
}

//! Full-text search index over a generated `tsvector` column.

use crate::store_error;
use agora_core::model::SearchIndexEntry;
use agora_core::store::{Result, SearchIndex};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::PgPool;

#[derive(sqlx::FromRow)]
struct EntryRow {
    post_id: String,
    user_id: String,
    content: String,
    created_at: DateTime<Utc>,
}

/// `PostgreSQL` [`SearchIndex`], keyed by `post_id`.
#[derive(Clone)]
pub struct PgSearchIndex {
    pool: PgPool,
}

impl PgSearchIndex {
    /// Wrap a pool connected to the search database.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl SearchIndex for PgSearchIndex {
    fn upsert<'a>(&'a self, entry: &'a SearchIndexEntry) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                INSERT INTO search_entries (post_id, user_id, content, created_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (post_id) DO NOTHING
                ",
            )
            .bind(&entry.post_id)
            .bind(&entry.user_id)
            .bind(&entry.content)
            .bind(entry.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("upsert search entry", &e))?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn remove<'a>(&'a self, post_id: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM search_entries WHERE post_id = $1")
                .bind(post_id)
                .execute(&self.pool)
                .await
                .map_err(|e| store_error("remove search entry", &e))?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn search<'a>(
        &'a self,
        query: &'a str,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<SearchIndexEntry>>> {
        Box::pin(async move {
            let rows: Vec<EntryRow> = sqlx::query_as(
                r"
                SELECT post_id, user_id, content, created_at
                FROM search_entries, plainto_tsquery('english', $1) AS q
                WHERE search_vector @@ q
                ORDER BY ts_rank(search_vector, q) DESC, created_at DESC
                LIMIT $2
                ",
            )
            .bind(query)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("search posts", &e))?;

            Ok(rows
                .into_iter()
                .map(|row| SearchIndexEntry {
                    post_id: row.post_id,
                    user_id: row.user_id,
                    content: row.content,
                    created_at: row.created_at,
                })
                .collect())
        })
    }
}

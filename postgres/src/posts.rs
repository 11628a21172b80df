//! Posts, likes and comments.

use crate::{store_error, to_u64};
use agora_core::model::{Comment, Like, PageRequest, Post, PostCounter};
use agora_core::store::{CommentStore, LikeStore, PostStore, Result};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::PgPool;

const POST_COLUMNS: &str = "id, author_id, content, media_ids, like_count, comment_count, created_at";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: String,
    author_id: String,
    content: String,
    media_ids: Vec<String>,
    like_count: i64,
    comment_count: i64,
    created_at: DateTime<Utc>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            author_id: row.author_id,
            content: row.content,
            media_ids: row.media_ids,
            like_count: row.like_count,
            comment_count: row.comment_count,
            created_at: row.created_at,
        }
    }
}

/// `PostgreSQL` [`PostStore`].
#[derive(Clone)]
pub struct PgPostStore {
    pool: PgPool,
}

impl PgPostStore {
    /// Wrap a pool connected to the posts database.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl PostStore for PgPostStore {
    fn insert<'a>(&'a self, post: &'a Post) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO posts (id, author_id, content, media_ids, like_count, comment_count, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(&post.id)
            .bind(&post.author_id)
            .bind(&post.content)
            .bind(&post.media_ids)
            .bind(post.like_count)
            .bind(post.comment_count)
            .bind(post.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("insert post", &e))?;
            Ok(())
        })
    }

    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Post>>> {
        Box::pin(async move {
            let row: Option<PostRow> =
                sqlx::query_as(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| store_error("get post", &e))?;
            Ok(row.map(Post::from))
        })
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Post>>> {
        Box::pin(async move {
            let row: Option<PostRow> =
                sqlx::query_as(&format!("DELETE FROM posts WHERE id = $1 RETURNING {POST_COLUMNS}"))
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| store_error("delete post", &e))?;
            Ok(row.map(Post::from))
        })
    }

    fn page(&self, page: PageRequest) -> BoxFuture<'_, Result<Vec<Post>>> {
        Box::pin(async move {
            let rows: Vec<PostRow> = sqlx::query_as(&format!(
                "SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
            ))
            .bind(i64::from(page.limit))
            .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("page posts", &e))?;
            Ok(rows.into_iter().map(Post::from).collect())
        })
    }

    fn count(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| store_error("count posts", &e))?;
            to_u64(count)
        })
    }

    fn adjust_counter<'a>(
        &'a self,
        id: &'a str,
        counter: PostCounter,
        delta: i64,
    ) -> BoxFuture<'a, Result<Option<i64>>> {
        Box::pin(async move {
            // Single-statement update; GREATEST keeps the CHECK constraint satisfied
            let sql = match counter {
                PostCounter::Likes => {
                    "UPDATE posts SET like_count = GREATEST(0, like_count + $2) WHERE id = $1 RETURNING like_count"
                }
                PostCounter::Comments => {
                    "UPDATE posts SET comment_count = GREATEST(0, comment_count + $2) WHERE id = $1 RETURNING comment_count"
                }
            };
            let value: Option<(i64,)> = sqlx::query_as(sql)
                .bind(id)
                .bind(delta)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| store_error("adjust post counter", &e))?;
            Ok(value.map(|(v,)| v))
        })
    }
}

/// `PostgreSQL` [`LikeStore`]. Duplicate pairs are rejected by the
/// `likes_post_user_key` constraint.
#[derive(Clone)]
pub struct PgLikeStore {
    pool: PgPool,
}

impl PgLikeStore {
    /// Wrap a pool connected to the posts database.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl LikeStore for PgLikeStore {
    fn insert<'a>(&'a self, like: &'a Like) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            sqlx::query("INSERT INTO likes (post_id, user_id, created_at) VALUES ($1, $2, $3)")
                .bind(&like.post_id)
                .bind(&like.user_id)
                .bind(like.created_at)
                .execute(&self.pool)
                .await
                .map_err(|e| store_error("insert like", &e))?;
            Ok(())
        })
    }

    fn remove<'a>(&'a self, post_id: &'a str, user_id: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM likes WHERE post_id = $1 AND user_id = $2")
                .bind(post_id)
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(|e| store_error("remove like", &e))?;
            Ok(result.rows_affected() > 0)
        })
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: String,
    post_id: String,
    user_id: String,
    content: String,
    created_at: DateTime<Utc>,
}

/// `PostgreSQL` [`CommentStore`].
#[derive(Clone)]
pub struct PgCommentStore {
    pool: PgPool,
}

impl PgCommentStore {
    /// Wrap a pool connected to the posts database.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CommentStore for PgCommentStore {
    fn insert<'a>(&'a self, comment: &'a Comment) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO comments (id, post_id, user_id, content, created_at) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&comment.id)
            .bind(&comment.post_id)
            .bind(&comment.user_id)
            .bind(&comment.content)
            .bind(comment.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("insert comment", &e))?;
            Ok(())
        })
    }

    fn latest_for_post<'a>(
        &'a self,
        post_id: &'a str,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<Comment>>> {
        Box::pin(async move {
            let rows: Vec<CommentRow> = sqlx::query_as(
                r"
                SELECT id, post_id, user_id, content, created_at
                FROM comments
                WHERE post_id = $1
                ORDER BY created_at DESC
                LIMIT $2
                ",
            )
            .bind(post_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("list comments", &e))?;

            Ok(rows
                .into_iter()
                .map(|row| Comment {
                    id: row.id,
                    post_id: row.post_id,
                    user_id: row.user_id,
                    content: row.content,
                    created_at: row.created_at,
                })
                .collect())
        })
    }
}

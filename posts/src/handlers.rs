//! HTTP surface of the post service. Every route requires the gateway's
//! `x-user-id` header.

use crate::feed::{FeedPage, FeedPost};
use crate::interactions::{CommentView, Interactions, LikeToggle, NewComment};
use crate::service::{NewPost, PostService};
use agora_core::model::{Comment, PageRequest};
use agora_web::{
    ApiResponse, AuthenticatedUser, Json, Query, WebResult, correlation_id_layer,
    server::health_routes,
};
use axum::{
    Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Post lifecycle
    pub posts: Arc<PostService>,
    /// Likes and comments
    pub interactions: Arc<Interactions>,
}

/// Build the post router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/posts/create-post", post(create_post))
        .route("/api/posts/all-posts", get(all_posts))
        .route("/api/posts/:id", get(get_post).delete(delete_post))
        .route("/api/posts/:id/like", post(like_post))
        .route("/api/posts/:id/comments", get(list_comments).post(add_comment))
        .with_state(state)
        .merge(health_routes("post-service"))
        .layer(correlation_id_layer())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Created {
    post_id: String,
}

async fn create_post(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(input): Json<NewPost>,
) -> WebResult<ApiResponse<Created>> {
    let post = state.posts.create(&user_id, input).await?;
    Ok(ApiResponse::created(Created { post_id: post.id }).with_message("Post created successfully"))
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

async fn all_posts(
    State(state): State<AppState>,
    AuthenticatedUser(_): AuthenticatedUser,
    Query(query): Query<PageQuery>,
) -> WebResult<ApiResponse<FeedPage>> {
    let defaults = PageRequest::default();
    let page = PageRequest::new(
        query.page.unwrap_or(defaults.page),
        query.limit.unwrap_or(defaults.limit),
    );
    Ok(ApiResponse::ok(state.posts.list(page).await?))
}

#[derive(Serialize)]
struct PostBody {
    post: FeedPost,
}

async fn get_post(
    State(state): State<AppState>,
    AuthenticatedUser(_): AuthenticatedUser,
    Path(id): Path<String>,
) -> WebResult<ApiResponse<PostBody>> {
    let post = state.posts.get(&id).await?;
    Ok(ApiResponse::ok(PostBody { post }))
}

async fn delete_post(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<String>,
) -> WebResult<ApiResponse<serde_json::Map<String, serde_json::Value>>> {
    state.posts.delete(&id, &user_id).await?;
    Ok(ApiResponse::message("Post deleted successfully"))
}

async fn like_post(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<String>,
) -> WebResult<ApiResponse<LikeToggle>> {
    let toggle = state.interactions.toggle_like(&id, &user_id).await?;
    let message = if toggle.liked { "Post liked" } else { "Post unliked" };
    Ok(ApiResponse::ok(toggle).with_message(message))
}

#[derive(Serialize)]
struct CommentBody {
    comment: Comment,
}

async fn add_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<String>,
    Json(input): Json<NewComment>,
) -> WebResult<ApiResponse<CommentBody>> {
    let comment = state.interactions.add_comment(&id, &user_id, input).await?;
    Ok(ApiResponse::created(CommentBody { comment }).with_message("Comment added"))
}

#[derive(Serialize)]
struct CommentsBody {
    comments: Vec<CommentView>,
}

async fn list_comments(
    State(state): State<AppState>,
    AuthenticatedUser(_): AuthenticatedUser,
    Path(id): Path<String>,
) -> WebResult<ApiResponse<CommentsBody>> {
    let comments = state.interactions.comments(&id).await?;
    Ok(ApiResponse::ok(CommentsBody { comments }))
}

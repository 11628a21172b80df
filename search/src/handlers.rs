//! HTTP surface of the search service.

use crate::service::SearchService;
use agora_core::model::SearchIndexEntry;
use agora_web::{
    ApiResponse, AuthenticatedUser, Query, WebResult, correlation_id_layer,
    server::health_routes,
};
use axum::{
    Router,
    extract::State,
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Build the search router.
pub fn router(service: Arc<SearchService>) -> Router {
    Router::new()
        .route("/api/search/posts", get(search_posts))
        .with_state(service)
        .merge(health_routes("search-service"))
        .layer(correlation_id_layer())
}

#[derive(Deserialize)]
struct SearchQuery {
    query: Option<String>,
}

#[derive(Serialize)]
struct ResultsBody {
    results: Vec<SearchIndexEntry>,
}

async fn search_posts(
    State(service): State<Arc<SearchService>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Query(query): Query<SearchQuery>,
) -> WebResult<ApiResponse<ResultsBody>> {
    tracing::debug!(user_id = %user_id, "Search requested");
    let results = service.search(query.query.as_deref()).await?;
    Ok(ApiResponse::ok(ResultsBody { results }))
}

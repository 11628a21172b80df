//! Query side of the search index.

use agora_core::model::SearchIndexEntry;
use agora_core::store::{SearchIndex, StoreError};
use agora_web::AppError;
use std::sync::Arc;
use thiserror::Error;

/// Results returned per query.
pub const MAX_RESULTS: u32 = 10;

/// Longest accepted query, in characters.
pub const MAX_QUERY_CHARS: usize = 200;

/// Errors returned by [`SearchService`].
#[derive(Error, Debug)]
pub enum SearchError {
    /// Query missing, blank or too long
    #[error("{0}")]
    Validation(String),

    /// Index failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Validation(message) => Self::bad_request(message),
            SearchError::Store(e) => Self::internal().with_source(e),
        }
    }
}

/// Runs queries against the index.
#[derive(Clone)]
pub struct SearchService {
    index: Arc<dyn SearchIndex>,
}

impl SearchService {
    /// Build the service over `index`.
    #[must_use]
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }

    /// Best matches for `query`, at most [`MAX_RESULTS`].
    ///
    /// # Errors
    ///
    /// [`SearchError::Validation`] for a missing or blank query,
    /// [`SearchError::Store`] if the index is unreachable.
    pub async fn search(&self, query: Option<&str>) -> Result<Vec<SearchIndexEntry>, SearchError> {
        let query = query.map(str::trim).unwrap_or_default();
        if query.is_empty() {
            return Err(SearchError::Validation("Search query is required".to_string()));
        }
        if query.chars().count() > MAX_QUERY_CHARS {
            return Err(SearchError::Validation(format!(
                "Search query must be at most {MAX_QUERY_CHARS} characters"
            )));
        }

        let results = self.index.search(query, MAX_RESULTS).await?;
        tracing::debug!(query, results = results.len(), "Search served");
        metrics::counter!("agora_search_queries_total").increment(1);
        Ok(results)
    }
}

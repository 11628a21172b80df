//! Keeps the search index in step with the post lifecycle.

use agora_core::events::PostEvent;
use agora_core::model::SearchIndexEntry;
use agora_core::projection::{Projection, ProjectionError};
use agora_core::store::SearchIndex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// `post.created` inserts an entry unless one exists for the post;
/// `post.deleted` removes it, and a missing entry is not an error.
pub struct SearchProjection {
    index: Arc<dyn SearchIndex>,
}

impl SearchProjection {
    /// Build the projection over `index`.
    #[must_use]
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }
}

impl Projection for SearchProjection {
    fn name(&self) -> &str {
        "search-index"
    }

    fn apply_event<'a>(
        &'a self,
        event: &'a PostEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + 'a>> {
        Box::pin(async move {
            match event {
                PostEvent::Created(created) => {
                    let entry = SearchIndexEntry {
                        post_id: created.post_id.clone(),
                        user_id: created.user_id.clone(),
                        content: created.content.clone(),
                        created_at: created.created_at,
                    };
                    let inserted = self
                        .index
                        .upsert(&entry)
                        .await
                        .map_err(|e| ProjectionError::Storage(e.to_string()))?;
                    if inserted {
                        tracing::info!(post_id = %created.post_id, "Search entry created");
                    } else {
                        tracing::debug!(post_id = %created.post_id, "Search entry already present");
                    }
                }
                PostEvent::Deleted(deleted) => {
                    let removed = self
                        .index
                        .remove(&deleted.post_id)
                        .await
                        .map_err(|e| ProjectionError::Storage(e.to_string()))?;
                    tracing::info!(post_id = %deleted.post_id, removed, "Search entry deleted");
                }
            }
            Ok(())
        })
    }
}

//! Removes the media of deleted posts.

use agora_core::events::PostEvent;
use agora_core::projection::{Projection, ProjectionError};
use agora_core::store::{BlobError, BlobStore, MediaStore};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Deletes the blob and row of every media id carried by `post.deleted`.
///
/// Each id is handled on its own: a row that is already gone counts as done,
/// a blob the provider no longer has counts as deleted, and the row is only
/// removed once its blob is. Ids that fail keep their row so a redelivery
/// retries exactly those.
pub struct MediaCleanupProjection {
    media: Arc<dyn MediaStore>,
    blobs: Arc<dyn BlobStore>,
}

impl MediaCleanupProjection {
    /// Build the projection.
    #[must_use]
    pub fn new(media: Arc<dyn MediaStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { media, blobs }
    }

    async fn remove_one(&self, media_id: &str) -> Result<bool, String> {
        let Some(media) = self
            .media
            .get(media_id)
            .await
            .map_err(|e| format!("lookup {media_id}: {e}"))?
        else {
            return Ok(false);
        };

        match self.blobs.delete(&media.public_id).await {
            Ok(()) => {}
            Err(BlobError::NotFound(_)) => {
                tracing::debug!(media_id, public_id = %media.public_id, "Blob already gone");
            }
            Err(e) => return Err(format!("blob {}: {e}", media.public_id)),
        }

        self.media
            .delete(media_id)
            .await
            .map_err(|e| format!("row {media_id}: {e}"))
    }
}

impl Projection for MediaCleanupProjection {
    fn name(&self) -> &str {
        "media-cleanup"
    }

    fn apply_event<'a>(
        &'a self,
        event: &'a PostEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + 'a>> {
        Box::pin(async move {
            let PostEvent::Deleted(deleted) = event else {
                return Ok(());
            };
            if deleted.media_ids.is_empty() {
                return Ok(());
            }

            let total = deleted.media_ids.len();
            let mut removed = 0usize;
            let mut failures = Vec::new();
            for media_id in &deleted.media_ids {
                match self.remove_one(media_id).await {
                    Ok(true) => removed += 1,
                    Ok(false) => {}
                    Err(reason) => {
                        tracing::warn!(post_id = %deleted.post_id, media_id = %media_id, error = %reason, "Media cleanup failed");
                        failures.push(reason);
                    }
                }
            }

            metrics::counter!("agora_media_cleaned_total").increment(removed as u64);
            tracing::info!(
                post_id = %deleted.post_id,
                total,
                removed,
                failed = failures.len(),
                "Media cleanup applied"
            );

            match failures.first() {
                None => Ok(()),
                Some(first) => Err(ProjectionError::Partial {
                    failed: failures.len(),
                    total,
                    reason: first.clone(),
                }),
            }
        })
    }
}

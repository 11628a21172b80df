//! Uploads and batched media lookups.

use agora_core::environment::{Clock, IdGenerator};
use agora_core::model::Media;
use agora_core::store::{BlobError, BlobStore, MediaStore, StoreError};
use agora_web::AppError;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

pub use agora_core::peers::MAX_LOOKUP_IDS;

/// Errors returned by [`MediaService`].
#[derive(Error, Debug)]
pub enum MediaError {
    /// Input rejected before any write
    #[error("{0}")]
    Validation(String),

    /// Upload exceeds the size cap
    #[error("File exceeds the {limit} byte limit")]
    TooLarge {
        /// Cap in bytes
        limit: usize,
    },

    /// Blob provider failure
    #[error(transparent)]
    Blob(#[from] BlobError),

    /// Store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Validation(message) => Self::bad_request(message),
            MediaError::TooLarge { .. } => Self::payload_too_large(err.to_string()),
            MediaError::Blob(e) => Self::internal().with_source(e),
            MediaError::Store(e) => Self::internal().with_source(e),
        }
    }
}

/// A file received from a client.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Name the client sent
    pub original_name: String,
    /// Content type the client sent
    pub mime_type: String,
    /// File contents
    pub bytes: Vec<u8>,
}

/// Media operations over injected adapters.
#[derive(Clone)]
pub struct MediaService {
    media: Arc<dyn MediaStore>,
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    max_bytes: usize,
}

impl MediaService {
    /// Build the service.
    #[must_use]
    pub fn new(
        media: Arc<dyn MediaStore>,
        blobs: Arc<dyn BlobStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        max_bytes: usize,
    ) -> Self {
        Self {
            media,
            blobs,
            clock,
            ids,
            max_bytes,
        }
    }

    /// Upload cap in bytes.
    #[must_use]
    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Store the blob, then record it.
    ///
    /// If the row cannot be written the blob is deleted again so no
    /// unreferenced blob is left behind.
    ///
    /// # Errors
    ///
    /// [`MediaError::Validation`] for an empty file, [`MediaError::TooLarge`]
    /// over the cap, or the provider/store failure.
    pub async fn upload(&self, owner_user_id: &str, upload: Upload) -> Result<Media, MediaError> {
        if upload.bytes.is_empty() {
            return Err(MediaError::Validation("No file uploaded".to_string()));
        }
        if upload.bytes.len() > self.max_bytes {
            return Err(MediaError::TooLarge {
                limit: self.max_bytes,
            });
        }

        let size = upload.bytes.len();
        let stored = self
            .blobs
            .upload(&upload.original_name, &upload.mime_type, upload.bytes)
            .await?;

        let media = Media {
            id: self.ids.next_id(),
            public_id: stored.public_id,
            original_name: upload.original_name,
            mime_type: upload.mime_type,
            url: stored.url,
            owner_user_id: owner_user_id.to_string(),
            created_at: self.clock.now(),
        };

        if let Err(e) = self.media.insert(&media).await {
            if let Err(cleanup) = self.blobs.delete(&media.public_id).await {
                tracing::warn!(public_id = %media.public_id, error = %cleanup, "Failed to remove blob of unrecorded upload");
            }
            return Err(e.into());
        }

        tracing::info!(media_id = %media.id, public_id = %media.public_id, bytes = size, mime_type = %media.mime_type, "Media uploaded");
        metrics::counter!("agora_media_uploads_total").increment(1);
        Ok(media)
    }

    /// Every media row when `ids` is `None`, otherwise the rows among `ids`
    /// that exist.
    ///
    /// # Errors
    ///
    /// [`MediaError::Validation`] for more than [`MAX_LOOKUP_IDS`] ids.
    pub async fn find(&self, ids: Option<&[String]>) -> Result<Vec<Media>, MediaError> {
        let Some(ids) = ids else {
            return Ok(self.media.list_all().await?);
        };

        let unique: BTreeSet<&str> = ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }
        if unique.len() > MAX_LOOKUP_IDS {
            return Err(MediaError::Validation(format!(
                "At most {MAX_LOOKUP_IDS} ids per lookup"
            )));
        }

        let ids: Vec<String> = unique.into_iter().map(ToString::to_string).collect();
        Ok(self.media.find_many(&ids).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use agora_testing::{InMemoryBlobStore, InMemoryMediaStore, SequentialIdGenerator, test_clock};
    use axum::http::StatusCode;

    fn service(max_bytes: usize) -> (MediaService, InMemoryMediaStore, InMemoryBlobStore) {
        let media = InMemoryMediaStore::new();
        let blobs = InMemoryBlobStore::new();
        let service = MediaService::new(
            Arc::new(media.clone()),
            Arc::new(blobs.clone()),
            Arc::new(test_clock()),
            Arc::new(SequentialIdGenerator::new("media")),
            max_bytes,
        );
        (service, media, blobs)
    }

    fn png(bytes: usize) -> Upload {
        Upload {
            original_name: "cat.png".to_string(),
            mime_type: "image/png".to_string(),
            bytes: vec![7; bytes],
        }
    }

    #[tokio::test]
    async fn upload_stores_blob_and_row() {
        let (service, media, blobs) = service(1024);
        let uploaded = service.upload("u1", png(10)).await.unwrap();

        assert_eq!(uploaded.id, "media-1");
        assert_eq!(uploaded.owner_user_id, "u1");
        assert!(media.contains("media-1"));
        assert!(blobs.contains(&uploaded.public_id));
    }

    #[tokio::test]
    async fn oversized_and_empty_uploads_are_rejected() {
        let (service, media, blobs) = service(8);

        let err = service.upload("u1", png(9)).await.unwrap_err();
        assert_eq!(AppError::from(err).status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(matches!(service.upload("u1", png(0)).await, Err(MediaError::Validation(_))));
        assert!(media.is_empty());
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn failed_row_write_removes_the_blob() {
        let (service, media, blobs) = service(1024);
        media.set_available(false);

        assert!(matches!(service.upload("u1", png(4)).await, Err(MediaError::Store(_))));
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn find_returns_known_ids_only() {
        let (service, _, _) = service(1024);
        let first = service.upload("u1", png(1)).await.unwrap();
        service.upload("u1", png(1)).await.unwrap();

        let ids = vec![first.id.clone(), "ghost".to_string(), first.id.clone()];
        let found = service.find(Some(&ids)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, first.id);

        assert_eq!(service.find(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn too_many_ids_is_a_validation_error() {
        let (service, _, _) = service(1024);
        let ids: Vec<String> = (0..=MAX_LOOKUP_IDS).map(|n| format!("m{n}")).collect();
        assert!(matches!(service.find(Some(&ids)).await, Err(MediaError::Validation(_))));
    }
}

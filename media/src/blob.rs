//! Filesystem blob provider.
//!
//! Blobs are written under a root directory with a random name that keeps the
//! upload's extension; the public URL is the configured base plus that name.

use agora_core::store::{BlobError, BlobStore, StoredBlob};
use futures::future::BoxFuture;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// [`BlobStore`] writing to a local directory.
#[derive(Debug, Clone)]
pub struct FilesystemBlobStore {
    root: PathBuf,
    public_url: String,
}

impl FilesystemBlobStore {
    /// Store under `root`, served from `public_url`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Directory blobs live in.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, public_id: &str) -> Result<PathBuf, BlobError> {
        // Only names shaped like the ones upload generates
        if public_id.is_empty()
            || !public_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
            || public_id.starts_with('.')
        {
            return Err(BlobError::NotFound(public_id.to_string()));
        }
        Ok(self.root.join(public_id))
    }
}

/// Lowercase alphanumeric extension of `name`, if it has a short one.
fn extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then(|| ext.to_ascii_lowercase())
}

impl BlobStore for FilesystemBlobStore {
    fn upload<'a>(
        &'a self,
        original_name: &'a str,
        _mime_type: &'a str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'a, Result<StoredBlob, BlobError>> {
        Box::pin(async move {
            let id = Uuid::new_v4().to_string();
            let public_id = match extension(original_name) {
                Some(ext) => format!("{id}.{ext}"),
                None => id,
            };

            tokio::fs::create_dir_all(&self.root)
                .await
                .map_err(|e| BlobError::Provider(format!("create {}: {e}", self.root.display())))?;
            tokio::fs::write(self.root.join(&public_id), &bytes)
                .await
                .map_err(|e| BlobError::Provider(format!("write {public_id}: {e}")))?;

            tracing::debug!(public_id = %public_id, bytes = bytes.len(), "Blob written");
            Ok(StoredBlob {
                url: format!("{}/{public_id}", self.public_url),
                public_id,
            })
        })
    }

    fn delete<'a>(&'a self, public_id: &'a str) -> BoxFuture<'a, Result<(), BlobError>> {
        Box::pin(async move {
            let path = self.path_of(public_id)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    Err(BlobError::NotFound(public_id.to_string()))
                }
                Err(e) => Err(BlobError::Provider(format!("delete {public_id}: {e}"))),
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scratch() -> FilesystemBlobStore {
        let root = std::env::temp_dir().join(format!("agora-blobs-{}", Uuid::new_v4()));
        FilesystemBlobStore::new(root, "https://cdn.example.com/files/")
    }

    #[tokio::test]
    async fn upload_then_delete() {
        let store = scratch();
        let blob = store.upload("Cat.PNG", "image/png", b"png".to_vec()).await.unwrap();

        assert!(blob.public_id.ends_with(".png"));
        assert_eq!(blob.url, format!("https://cdn.example.com/files/{}", blob.public_id));
        assert_eq!(tokio::fs::read(store.root().join(&blob.public_id)).await.unwrap(), b"png");

        store.delete(&blob.public_id).await.unwrap();
        assert_eq!(
            store.delete(&blob.public_id).await,
            Err(BlobError::NotFound(blob.public_id.clone()))
        );

        tokio::fs::remove_dir_all(store.root()).await.unwrap();
    }

    #[tokio::test]
    async fn delete_refuses_paths_outside_the_root() {
        let store = scratch();
        assert!(matches!(store.delete("../etc/passwd").await, Err(BlobError::NotFound(_))));
        assert!(matches!(store.delete("").await, Err(BlobError::NotFound(_))));
    }

    #[test]
    fn extension_is_kept_only_when_sane() {
        assert_eq!(extension("photo.JPG").as_deref(), Some("jpg"));
        assert_eq!(extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension("noext"), None);
        assert_eq!(extension("weird.p/ng"), None);
    }
}

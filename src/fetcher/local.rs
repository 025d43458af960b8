use std::path::{Component, Path, PathBuf};

use tokio_util::sync::CancellationToken;

use super::BlobFetcher;
use crate::error::FetchError;
use crate::types::BlobRef;

/// Filesystem blob store: the blob `abc` lives at `{root}/abc`
#[derive(Clone, Debug)]
pub struct LocalBlobFetcher {
    root: PathBuf,
}

impl LocalBlobFetcher {
    /// Create a fetcher rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a reference to a path, refusing anything that could leave the root
    fn resolve(&self, reference: &BlobRef) -> Result<PathBuf, FetchError> {
        let relative = Path::new(reference.as_str());
        let escapes = reference.as_str().is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(FetchError::Backend {
                reference: reference.to_string(),
                reason: "reference is not a plain relative path".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait::async_trait]
impl BlobFetcher for LocalBlobFetcher {
    async fn fetch(
        &self,
        reference: &BlobRef,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, FetchError> {
        let path = self.resolve(reference)?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            read = tokio::fs::read(&path) => match read {
                Ok(bytes) => {
                    tracing::trace!(%reference, bytes = bytes.len(), "read blob from disk");
                    Ok(bytes)
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FetchError::NotFound {
                    reference: reference.to_string(),
                }),
                Err(e) => Err(FetchError::Io(e)),
            },
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_blob_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dicom")).unwrap();
        std::fs::write(dir.path().join("dicom/abc"), b"DICM-bytes").unwrap();

        let fetcher = LocalBlobFetcher::new(dir.path());
        let bytes = fetcher
            .fetch(&BlobRef::from("dicom/abc"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(bytes, b"DICM-bytes");
    }

    #[tokio::test]
    async fn missing_blob_maps_to_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = LocalBlobFetcher::new(dir.path());

        let err = fetcher
            .fetch(&BlobRef::from("nope"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::NotFound { reference } if reference == "nope"));
    }

    #[tokio::test]
    async fn traversal_and_absolute_references_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = LocalBlobFetcher::new(dir.path().join("blobs"));
        let token = CancellationToken::new();

        for reference in ["../secret", "/etc/passwd", "a/../../b", ""] {
            let err = fetcher.fetch(&BlobRef::from(reference), &token).await.unwrap_err();
            assert!(
                matches!(err, FetchError::Backend { .. }),
                "{reference:?} should be refused, got {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc"), b"x").unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = LocalBlobFetcher::new(dir.path())
            .fetch(&BlobRef::from("abc"), &token)
            .await;
        assert!(matches!(result, Err(FetchError::Cancelled)));
    }
}

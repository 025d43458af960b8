use tokio_util::sync::CancellationToken;
use url::Url;

use super::BlobFetcher;
use crate::error::{Error, FetchError, Result};
use crate::types::BlobRef;

/// HTTP blob store client: `GET {base_url}/blobs/{reference}`
#[derive(Clone, Debug)]
pub struct HttpBlobFetcher {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBlobFetcher {
    /// Create a fetcher for the store at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Create a fetcher reusing an existing HTTP client
    pub fn with_client(base_url: &str, client: reqwest::Client) -> Result<Self> {
        let mut base_url = Url::parse(base_url).map_err(|e| Error::Config {
            message: format!("invalid blob store URL {base_url:?}: {e}"),
            key: Some("base_url".to_string()),
        })?;
        // Url::join replaces the last path segment unless the base ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    /// URL of the blob stored under `reference`
    pub fn blob_url(&self, reference: &BlobRef) -> std::result::Result<Url, FetchError> {
        let segment = format!("blobs/{}", urlencoding::encode(reference.as_str()));
        self.base_url
            .join(&segment)
            .map_err(|e| FetchError::Backend {
                reference: reference.to_string(),
                reason: format!("cannot build URL: {e}"),
            })
    }

    async fn get(&self, reference: &BlobRef) -> std::result::Result<Vec<u8>, FetchError> {
        let url = self.blob_url(reference)?;
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound {
                reference: reference.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                reference: reference.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        tracing::trace!(%reference, bytes = bytes.len(), "downloaded blob");
        Ok(bytes.to_vec())
    }
}

#[async_trait::async_trait]
impl BlobFetcher for HttpBlobFetcher {
    async fn fetch(
        &self,
        reference: &BlobRef,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<u8>, FetchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.get(reference) => result,
        }
    }
}

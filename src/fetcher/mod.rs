//! Blob retrieval
//!
//! The export coordinator only sees the [`BlobFetcher`] trait. Two adapters
//! are provided: [`HttpBlobFetcher`] for a blob store reachable over HTTP and
//! [`LocalBlobFetcher`] for blobs laid out on a filesystem.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::BlobStoreConfig;
use crate::error::{Error, FetchError, Result};
use crate::types::BlobRef;

mod http;
mod local;

pub use http::HttpBlobFetcher;
pub use local::LocalBlobFetcher;

/// Retrieves the binary content stored under a blob reference
///
/// Implementations may block on I/O and may fail; a failure only affects the
/// image being fetched. Implementations should return
/// [`FetchError::Cancelled`] promptly once `cancel` fires.
#[async_trait::async_trait]
pub trait BlobFetcher: Send + Sync {
    /// Fetch the bytes stored under `reference`
    async fn fetch(
        &self,
        reference: &BlobRef,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<u8>, FetchError>;
}

/// Build the fetcher described by the blob store configuration
///
/// An HTTP base URL takes precedence over a root directory.
pub fn from_config(config: &BlobStoreConfig) -> Result<Arc<dyn BlobFetcher>> {
    if let Some(base_url) = &config.base_url {
        return Ok(Arc::new(HttpBlobFetcher::new(base_url)?));
    }
    if let Some(root_dir) = &config.root_dir {
        return Ok(Arc::new(LocalBlobFetcher::new(root_dir.clone())));
    }
    Err(Error::Config {
        message: "no blob store configured: set base_url or root_dir".to_string(),
        key: Some("blob_store".to_string()),
    })
}

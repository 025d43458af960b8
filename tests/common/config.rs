//! Test configuration helpers

use std::path::Path;
use std::time::Duration;

use dataset_export::{ArchiveCompression, Config, RetryConfig};

/// Config reading blobs from `root_dir` with `concurrency` fetch slots
pub fn local_config(root_dir: &Path, concurrency: usize) -> Config {
    let mut config = Config::default();
    config.blob_store.root_dir = Some(root_dir.to_path_buf());
    config.export.max_concurrent_fetches = concurrency;
    config.export.compression = ArchiveCompression::Stored;
    config.retry = fast_retry();
    config
}

/// Config fetching blobs from an HTTP store at `base_url`
pub fn http_config(base_url: &str, concurrency: usize) -> Config {
    let mut config = Config::default();
    config.blob_store.base_url = Some(base_url.to_string());
    config.export.max_concurrent_fetches = concurrency;
    config.retry = fast_retry();
    config
}

/// Retry policy with millisecond backoff so tests stay quick
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

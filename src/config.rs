//! Configuration types for dataset-export
//!
//! All connection details and tuning knobs travel in an explicit [`Config`]
//! value handed to constructors; nothing is read from process-wide state.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Export behavior configuration (concurrency, timeouts, file naming)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Maximum simultaneous in-flight blob fetches (default: 16)
    ///
    /// Bounds load on the blob store and the number of image payloads held
    /// in memory at once.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Timeout for a single blob fetch, including retries (default: 60 seconds)
    ///
    /// A fetch exceeding it is treated as a per-image failure.
    #[serde(
        default = "default_fetch_timeout",
        with = "seconds::option"
    )]
    pub fetch_timeout: Option<Duration>,

    /// Deadline for the whole export (None = no deadline)
    #[serde(default, with = "seconds::option")]
    pub export_deadline: Option<Duration>,

    /// File extension used for original (clinical) images (default: "dcm")
    #[serde(default = "default_original_extension")]
    pub original_extension: String,

    /// File extension used for distributable images (default: "jpg")
    #[serde(default = "default_distributable_extension")]
    pub distributable_extension: String,

    /// Compression applied to archive entries
    #[serde(default)]
    pub compression: ArchiveCompression,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
            fetch_timeout: default_fetch_timeout(),
            export_deadline: None,
            original_extension: default_original_extension(),
            distributable_extension: default_distributable_extension(),
            compression: ArchiveCompression::default(),
        }
    }
}

/// Compression method for archive entries
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveCompression {
    /// Store entries uncompressed (DICOM payloads rarely shrink much)
    Stored,
    /// Deflate entries (default)
    #[default]
    Deflated,
}

impl ArchiveCompression {
    /// The zip compression method for this setting
    pub fn method(&self) -> zip::CompressionMethod {
        match self {
            ArchiveCompression::Stored => zip::CompressionMethod::Stored,
            ArchiveCompression::Deflated => zip::CompressionMethod::Deflated,
        }
    }
}

/// Blob store connection settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BlobStoreConfig {
    /// Base URL of an HTTP blob store (e.g., "http://10.0.15.94:8080")
    #[serde(default)]
    pub base_url: Option<String>,

    /// Root directory of a filesystem blob store
    #[serde(default)]
    pub root_dir: Option<PathBuf>,
}

/// Backoff policy for transient blob fetch failures
///
/// Retries run inside the image's task and hold its fetch slot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt; 0 disables retrying (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause before the first retry, in seconds (default: 1)
    #[serde(default = "default_initial_delay", with = "seconds")]
    pub initial_delay: Duration,

    /// Upper bound on any pause, in seconds (default: 30)
    #[serde(default = "default_max_delay", with = "seconds")]
    pub max_delay: Duration,

    /// Growth factor between consecutive pauses (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Stretch each pause by a random factor up to 2x (default: true)
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

/// Main configuration for the dataset exporter
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Export behavior settings
    #[serde(default)]
    pub export: ExportConfig,

    /// Blob store connection settings
    #[serde(default)]
    pub blob_store: BlobStoreConfig,

    /// Retry policy for blob fetches
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Check values that serde alone cannot reject
    pub fn validate(&self) -> Result<()> {
        if self.export.max_concurrent_fetches == 0 {
            return Err(config_error(
                "max_concurrent_fetches",
                "must be at least 1",
            ));
        }
        if self.export.fetch_timeout == Some(Duration::ZERO) {
            return Err(config_error("fetch_timeout", "must be greater than zero"));
        }
        if self.export.export_deadline == Some(Duration::ZERO) {
            return Err(config_error(
                "export_deadline",
                "must be greater than zero",
            ));
        }
        for (key, ext) in [
            ("original_extension", &self.export.original_extension),
            ("distributable_extension", &self.export.distributable_extension),
        ] {
            if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(config_error(key, "must be a non-empty alphanumeric extension"));
            }
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(config_error(
                "backoff_multiplier",
                "must be a finite number of at least 1.0",
            ));
        }
        if let Some(base_url) = &self.blob_store.base_url {
            url::Url::parse(base_url)
                .map_err(|e| config_error("base_url", &format!("invalid URL: {e}")))?;
        }
        Ok(())
    }
}

fn config_error(key: &str, message: &str) -> Error {
    Error::Config {
        message: format!("{key} {message}"),
        key: Some(key.to_string()),
    }
}

fn default_max_concurrent_fetches() -> usize {
    16
}

fn default_fetch_timeout() -> Option<Duration> {
    Some(Duration::from_secs(60))
}

fn default_original_extension() -> String {
    "dcm".to_string()
}

fn default_distributable_extension() -> String {
    "jpg".to_string()
}

fn default_jitter() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

/// Durations as (fractional) seconds, so `0.25` means 250 ms
mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        parse(f64::deserialize(deserializer)?)
    }

    pub(super) fn parse<E: serde::de::Error>(secs: f64) -> Result<Duration, E> {
        Duration::try_from_secs_f64(secs).map_err(|e| E::custom(format!("invalid duration {secs}: {e}")))
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            duration: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match duration {
                Some(d) => serializer.serialize_some(&d.as_secs_f64()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<f64>::deserialize(deserializer)?
                .map(parse::<D::Error>)
                .transpose()
        }
    }
}

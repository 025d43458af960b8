//! Error types for dataset-export
//!
//! Errors fall into two families with different propagation rules:
//! - Per-image errors ([`FetchError`], [`Error::InvalidField`], [`Error::MalformedKey`])
//!   are absorbed by the export coordinator; the image is skipped and the export continues.
//! - Structural errors ([`Error::ArchiveIo`], [`Error::Cancelled`], [`Error::DeadlineExceeded`])
//!   abort the whole export and are returned to the caller.
//!
//! [`ToHttpStatus`] maps every variant to a status code for the HTTP layer that triggers exports.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for dataset-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for dataset-export
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_fetches")
        key: Option<String>,
    },

    /// A mandatory request or filter parameter was absent
    #[error("missing required field: {field}")]
    MissingRequiredField {
        /// Name of the missing parameter (e.g., "tipoEstudio")
        field: String,
    },

    /// A classification field is outside its enumerated range or has the wrong width
    #[error("invalid value {value:?} for field {field}: {reason}")]
    InvalidField {
        /// Name of the offending field (e.g., "age_bracket")
        field: String,
        /// The rejected value
        value: String,
        /// Why the value was rejected
        reason: String,
    },

    /// A classification key that cannot be split into positional fields
    #[error("malformed classification key {key:?}: {reason}")]
    MalformedKey {
        /// The rejected key
        key: String,
        /// Why the key was rejected
        reason: String,
    },

    /// Blob retrieval failed for a single image
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Archive entry creation or write failed; fatal to the export
    #[error("archive I/O error at {path}: {reason}")]
    ArchiveIo {
        /// Archive path being written when the failure occurred
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// The caller cancelled the export
    #[error("export cancelled")]
    Cancelled,

    /// The export did not finish within its configured deadline
    #[error("export exceeded its deadline of {after:?}")]
    DeadlineExceeded {
        /// The configured deadline
        after: Duration,
    },

    /// A retrieval task ended abnormally (panicked or was aborted)
    #[error("export task failed: {0}")]
    TaskFailed(String),

    /// The study repository could not answer the query
    #[error("repository error: {0}")]
    Repository(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl Error {
    /// Whether this error aborts an export as a whole rather than a single image
    pub fn is_fatal_to_export(&self) -> bool {
        !matches!(
            self,
            Error::Fetch(_) | Error::InvalidField { .. } | Error::MalformedKey { .. }
        )
    }
}

/// Per-image blob retrieval errors
#[derive(Debug, Error)]
pub enum FetchError {
    /// No blob is stored under the reference
    #[error("blob {reference} not found")]
    NotFound {
        /// The blob reference that was requested
        reference: String,
    },

    /// The blob store rejected or failed the request
    #[error("blob store failed for {reference}: {reason}")]
    Backend {
        /// The blob reference that was requested
        reference: String,
        /// The reason reported by the backend
        reason: String,
    },

    /// The blob store answered with an unexpected HTTP status
    #[error("blob store returned HTTP {status} for {reference}")]
    Status {
        /// The blob reference that was requested
        reference: String,
        /// HTTP status code returned by the store
        status: u16,
    },

    /// The fetch did not complete within the configured timeout
    #[error("fetch of {reference} timed out after {after:?}")]
    Timeout {
        /// The blob reference that was requested
        reference: String,
        /// The timeout that elapsed
        after: Duration,
    },

    /// The fetch was cancelled before completion
    #[error("fetch cancelled")]
    Cancelled,

    /// Local I/O failure while reading a blob
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level failure talking to the blob store
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Convert errors to HTTP status codes for the layer that triggers exports
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - caller supplied bad criteria
            Error::MissingRequiredField { .. } => 400,
            Error::InvalidField { .. } => 400,
            Error::MalformedKey { .. } => 400,

            // 499 Client Closed Request
            Error::Cancelled => 499,

            // 502 Bad Gateway - blob store failures
            Error::Fetch(_) => 502,
            Error::Network(_) => 502,

            // 504 Gateway Timeout
            Error::DeadlineExceeded { .. } => 504,

            // 500 Internal Server Error
            Error::Config { .. } => 500,
            Error::ArchiveIo { .. } => 500,
            Error::TaskFailed(_) => 500,
            Error::Repository(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::MissingRequiredField { .. } => "missing_required_field",
            Error::InvalidField { .. } => "invalid_field",
            Error::MalformedKey { .. } => "malformed_key",
            Error::Fetch(e) => match e {
                FetchError::NotFound { .. } => "blob_not_found",
                FetchError::Backend { .. } => "blob_store_error",
                FetchError::Status { .. } => "blob_store_status",
                FetchError::Timeout { .. } => "fetch_timeout",
                FetchError::Cancelled => "fetch_cancelled",
                FetchError::Io(_) => "io_error",
                FetchError::Network(_) => "network_error",
            },
            Error::ArchiveIo { .. } => "archive_io_error",
            Error::Cancelled => "cancelled",
            Error::DeadlineExceeded { .. } => "deadline_exceeded",
            Error::TaskFailed(_) => "task_failed",
            Error::Repository(_) => "repository_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Network(_) => "network_error",
        }
    }
}

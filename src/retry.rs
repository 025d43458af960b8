//! Retry of transient blob store failures
//!
//! A blob fetch that fails with a timeout, a dropped connection or a 5xx
//! answer is re-run inside its own task, with exponentially growing pauses.
//! Errors opt in through [`IsRetryable`]; anything else is returned at once.
//!
//! # Example
//!
//! ```no_run
//! use dataset_export::config::RetryConfig;
//! use dataset_export::error::FetchError;
//! use dataset_export::retry::fetch_with_retry;
//! use dataset_export::{BlobFetcher, BlobRef, LocalBlobFetcher};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), FetchError> {
//! let fetcher = LocalBlobFetcher::new("/var/lib/blobs");
//! let reference = BlobRef::from("64f0c0ffee");
//! let cancel = CancellationToken::new();
//!
//! let bytes = fetch_with_retry(&RetryConfig::default(), || {
//!     fetcher.fetch(&reference, &cancel)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::error::FetchError;

/// Errors that know whether another attempt could succeed
///
/// Transient failures (network timeouts, store busy, connection reset) return `true`.
/// Permanent failures (blob missing, request rejected, cancellation) return `false`.
pub trait IsRetryable {
    /// Whether the failed operation is worth running again
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(e) => e.is_timeout() || e.is_connect(),
            FetchError::Io(e) => is_transient_io(e),
            // 5xx and 429 are the store asking us to come back later
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            FetchError::Backend { reason, .. } => {
                reason.contains("timeout") || reason.contains("busy") || reason.contains("temporary")
            }
            // The overall fetch timeout already covers every attempt
            FetchError::Timeout { .. } => false,
            FetchError::NotFound { .. } => false,
            FetchError::Cancelled => false,
        }
    }
}

fn is_transient_io(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::Interrupted
    )
}

/// Pause schedule between attempts: `initial_delay`, growing by
/// `backoff_multiplier`, capped at `max_delay`
struct Backoff<'a> {
    config: &'a RetryConfig,
    next: Duration,
    retries: u32,
}

impl<'a> Backoff<'a> {
    fn new(config: &'a RetryConfig) -> Self {
        Self {
            config,
            next: config.initial_delay,
            retries: 0,
        }
    }

    /// The pause before the next attempt, or `None` once retries are spent
    fn pause(&mut self) -> Option<Duration> {
        if self.retries >= self.config.max_attempts {
            return None;
        }
        self.retries += 1;

        let base = self.next;
        let grown = base.as_secs_f64() * self.config.backoff_multiplier;
        self.next = Duration::try_from_secs_f64(grown)
            .unwrap_or(self.config.max_delay)
            .min(self.config.max_delay);

        Some(if self.config.jitter {
            add_jitter(base)
        } else {
            base
        })
    }
}

/// Run `operation` until it succeeds, fails permanently, or retries run out
///
/// `config.max_attempts` counts retries, so the operation runs at most
/// `max_attempts + 1` times. The last error is returned.
pub async fn fetch_with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut backoff = Backoff::new(config);

    loop {
        let error = match operation().await {
            Ok(value) => {
                if backoff.retries > 0 {
                    tracing::debug!(retries = backoff.retries, "Fetch recovered after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !error.is_retryable() {
            return Err(error);
        }
        let Some(pause) = backoff.pause() else {
            tracing::debug!(error = %error, retries = backoff.retries, "Giving up on transient fetch failure");
            return Err(error);
        };

        tracing::debug!(
            error = %error,
            retry = backoff.retries,
            max_attempts = config.max_attempts,
            pause_ms = pause.as_millis(),
            "Transient fetch failure, retrying"
        );
        tokio::time::sleep(pause).await;
    }
}

/// Stretch `delay` by a random factor in `[1, 2]`
fn add_jitter(delay: Duration) -> Duration {
    let factor = 1.0 + rand::thread_rng().gen_range(0.0..=1.0);
    delay.mul_f64(factor)
}

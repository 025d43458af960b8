//! Shared test helpers for exercising the export coordinator.

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::ThreadId;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{ArchiveCompression, ExportConfig, RetryConfig};
use crate::error::FetchError;
use crate::export::ExportCoordinator;
use crate::fetcher::BlobFetcher;
use crate::types::{BlobRef, DiagnosisMetadata, EligibleImage};

/// In-memory fetcher with scripted failures and delays
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    failures: HashSet<String>,
    transient: HashSet<String>,
    failed_once: Mutex<HashSet<String>>,
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make fetches of `reference` fail with `NotFound`
    pub(crate) fn fail(mut self, reference: &str) -> Self {
        self.failures.insert(reference.to_string());
        self
    }

    /// Make the first fetch of `reference` fail with HTTP 503
    pub(crate) fn transient(mut self, reference: &str) -> Self {
        self.transient.insert(reference.to_string());
        self
    }

    /// Delay fetches of `reference`
    pub(crate) fn delay(mut self, reference: &str, delay: Duration) -> Self {
        self.delays.insert(reference.to_string(), delay);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Blob content served for a reference
pub(crate) fn blob_content(reference: &str) -> Vec<u8> {
    format!("blob:{reference}").into_bytes()
}

#[async_trait::async_trait]
impl BlobFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        reference: &BlobRef,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .delays
            .get(reference.as_str())
            .copied()
            .unwrap_or(Duration::from_millis(1));
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            _ = tokio::time::sleep(delay) => {
                if self.failures.contains(reference.as_str()) {
                    Err(FetchError::NotFound { reference: reference.to_string() })
                } else if self.transient.contains(reference.as_str())
                    && self.failed_once.lock().unwrap().insert(reference.to_string())
                {
                    Err(FetchError::Status { reference: reference.to_string(), status: 503 })
                } else {
                    Ok(blob_content(reference.as_str()))
                }
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Sink that accepts `limit` bytes and then fails every write
pub(crate) struct FailingSink {
    inner: Cursor<Vec<u8>>,
    limit: u64,
}

impl FailingSink {
    pub(crate) fn new(limit: u64) -> Self {
        Self {
            inner: Cursor::new(Vec::new()),
            limit,
        }
    }
}

impl Write for FailingSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.inner.position() + buf.len() as u64 > self.limit {
            return Err(std::io::Error::other("disk full"));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for FailingSink {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// In-memory sink remembering every thread that wrote to or seeked it
#[derive(Default)]
pub(crate) struct ThreadRecordingSink {
    inner: Cursor<Vec<u8>>,
    threads: Arc<Mutex<HashSet<ThreadId>>>,
}

impl ThreadRecordingSink {
    pub(crate) fn threads(&self) -> Arc<Mutex<HashSet<ThreadId>>> {
        Arc::clone(&self.threads)
    }

    fn record(&self) {
        self.threads.lock().unwrap().insert(std::thread::current().id());
    }
}

impl Write for ThreadRecordingSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.record();
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.record();
        self.inner.flush()
    }
}

impl Seek for ThreadRecordingSink {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.record();
        self.inner.seek(pos)
    }
}

/// Eligible image whose original blob is named `o-{n}`
pub(crate) fn image(key: &str, n: usize) -> EligibleImage {
    EligibleImage {
        study_id: format!("s-{n}"),
        key: key.to_string(),
        original: Some(BlobRef::new(format!("o-{n}"))),
        distributable: Some(BlobRef::new(format!("d-{n}"))),
        diagnosis: Some(DiagnosisMetadata {
            findings: format!("hallazgo {n}"),
            impression: "normal".to_string(),
            observations: String::new(),
            issued_at: chrono::Utc::now(),
        }),
    }
}

/// `count` images cycling through a few groups
pub(crate) fn images(count: usize) -> Vec<EligibleImage> {
    const KEYS: [&str; 3] = ["01020501106", "01030200015", "02000101121"];
    (1..=count).map(|n| image(KEYS[n % KEYS.len()], n)).collect()
}

/// Export settings for tests: stored entries, no retries
pub(crate) fn export_config(concurrency: usize) -> ExportConfig {
    ExportConfig {
        max_concurrent_fetches: concurrency,
        compression: ArchiveCompression::Stored,
        ..ExportConfig::default()
    }
}

pub(crate) fn no_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 0,
        ..RetryConfig::default()
    }
}

pub(crate) fn coordinator(fetcher: Arc<ScriptedFetcher>, concurrency: usize) -> ExportCoordinator {
    ExportCoordinator::new(fetcher, export_config(concurrency), no_retry())
}

/// Entry names of a finished archive, in the order they were written
pub(crate) fn entry_names(bytes: &[u8]) -> Vec<String> {
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .collect()
}

pub(crate) fn read_entry(bytes: &[u8], path: &str) -> Vec<u8> {
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = zip.by_name(path).unwrap();
    let mut out = Vec::new();
    file.read_to_end(&mut out).unwrap();
    out
}

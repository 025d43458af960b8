//! Bounded-concurrency export of eligible images into a single archive.
//!
//! Phases:
//! 1. Write the front matter sequentially
//! 2. Walk the images in order, assigning serials and fanning out one
//!    retrieval task per image, at most `max_concurrent_fetches` in flight
//! 3. Each task fetches outside the lock, then writes its entry and metadata
//!    record inside the single archive critical section
//! 4. Join every task, write one metadata document per group, finalize
//!
//! All archive I/O runs on the blocking thread pool. An image task keeps the
//! archive lock (an owned guard) until its blocking write has returned.

use std::collections::BTreeMap;
use std::io::{Seek, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, broadcast};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::archive::ArchiveWriter;
use super::front_matter::write_front_matter;
use super::metadata::{MetadataAggregator, MetadataRecord};
use crate::classification;
use crate::config::{ExportConfig, RetryConfig};
use crate::error::{Error, FetchError, Result};
use crate::fetcher::BlobFetcher;
use crate::retry::fetch_with_retry;
use crate::types::{BinaryKind, BlobRef, DiagnosisMetadata, EligibleImage, ExportEvent};

/// Capacity of the progress event channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// An image entry that made it into the archive
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WrittenEntry {
    /// Serial assigned to the image
    pub serial: u32,
    /// Classification key of the image
    pub key: String,
    /// Archive path of the entry
    pub path: String,
}

/// An image left out of the archive
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedImage {
    /// Serial assigned to the image; `None` when skipped before assignment
    pub serial: Option<u32>,
    /// Classification key of the image
    pub key: String,
    /// Why the image was skipped
    pub reason: String,
}

/// Summary of a finished export
#[derive(Clone, Debug, Default, Serialize)]
pub struct ExportReport {
    /// Images handed to the coordinator
    pub candidates: usize,
    /// Serials assigned (`1..=serials_assigned`)
    pub serials_assigned: u32,
    /// Entries written, in completion order
    pub written: Vec<WrittenEntry>,
    /// Images skipped, ordered by serial
    pub skipped: Vec<SkippedImage>,
    /// Metadata records per group prefix
    pub groups: BTreeMap<String, usize>,
}

impl ExportReport {
    /// Serials in the order their entries were written
    pub fn completion_order(&self) -> Vec<u32> {
        self.written.iter().map(|e| e.serial).collect()
    }

    /// Whether every candidate made it into the archive
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Result of a successful export: the finalized sink and its report
#[derive(Debug)]
pub struct ExportOutcome<W> {
    /// The sink holding the finalized archive
    pub archive: W,
    /// What went into the archive and what was left out
    pub report: ExportReport,
}

/// Everything a retrieval task needs to place one image
#[derive(Clone, Debug)]
struct PlannedImage {
    serial: u32,
    key: String,
    group: String,
    file_name: String,
    path: String,
    blob: BlobRef,
    diagnosis: Option<DiagnosisMetadata>,
}

impl PlannedImage {
    fn plan(
        image: &EligibleImage,
        kind: BinaryKind,
        serial: u32,
        extension: &str,
    ) -> Result<Self> {
        classification::decode(&image.key)?;
        let group = classification::group_prefix(&image.key)?.to_string();
        let blob = image
            .blob(kind)
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                reference: format!("{kind:?} of study {}", image.study_id),
            })?;
        let file_name = classification::file_name(&image.key, serial, extension);
        Ok(Self {
            serial,
            key: image.key.clone(),
            path: format!("imagenes/{group}/{file_name}"),
            group,
            file_name,
            blob,
            diagnosis: image.diagnosis.clone(),
        })
    }
}

/// State guarded by the archive critical section
struct ExportState<W: Write + Seek> {
    archive: ArchiveWriter<W>,
    metadata: MetadataAggregator,
    written: Vec<WrittenEntry>,
}

/// Shared context for the retrieval tasks of one export
struct TaskContext<W: Write + Seek> {
    fetcher: Arc<dyn BlobFetcher>,
    retry: Arc<RetryConfig>,
    fetch_timeout: Option<Duration>,
    state: Arc<Mutex<ExportState<W>>>,
    scope: CancellationToken,
    event_tx: broadcast::Sender<ExportEvent>,
}

impl<W: Write + Seek> Clone for TaskContext<W> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            retry: Arc::clone(&self.retry),
            fetch_timeout: self.fetch_timeout,
            state: Arc::clone(&self.state),
            scope: self.scope.clone(),
            event_tx: self.event_tx.clone(),
        }
    }
}

enum TaskOutcome {
    Written,
    Skipped(SkippedImage),
    Cancelled,
}

/// Orchestrates bounded-concurrency retrieval and serialized archive writes
#[derive(Clone)]
pub struct ExportCoordinator {
    fetcher: Arc<dyn BlobFetcher>,
    config: Arc<ExportConfig>,
    retry: Arc<RetryConfig>,
    event_tx: broadcast::Sender<ExportEvent>,
}

impl ExportCoordinator {
    /// Create a coordinator fetching through `fetcher`
    pub fn new(fetcher: Arc<dyn BlobFetcher>, config: ExportConfig, retry: RetryConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            fetcher,
            config: Arc::new(config),
            retry: Arc::new(retry),
            event_tx,
        }
    }

    /// Subscribe to progress events of subsequent exports
    pub fn subscribe(&self) -> broadcast::Receiver<ExportEvent> {
        self.event_tx.subscribe()
    }

    /// Export configuration in use
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    fn extension(&self, kind: BinaryKind) -> &str {
        match kind {
            BinaryKind::Original => &self.config.original_extension,
            BinaryKind::Distributable => &self.config.distributable_extension,
        }
    }

    /// Export `images` into a new archive written to `sink`
    ///
    /// Per-image failures are logged and recorded in the report; the export
    /// carries on without them. Archive-level failures, cancellation through
    /// `cancel`, and an expired deadline abort the export: the partially
    /// written sink is dropped and the error is returned.
    pub async fn export<W>(
        &self,
        images: Vec<EligibleImage>,
        sink: W,
        kind: BinaryKind,
        cancel: CancellationToken,
    ) -> Result<ExportOutcome<W>>
    where
        W: Write + Seek + Send + 'static,
    {
        let concurrency = self.config.max_concurrent_fetches.max(1);
        let extension = self.extension(kind).to_string();
        let candidates = images.len();

        tracing::info!(candidates, concurrency, ?kind, "Starting dataset export");

        // Phase 1: front matter, before any concurrency
        let compression = self.config.compression;
        let front_matter_extension = extension.clone();
        let archive = run_blocking(move || {
            let mut archive = ArchiveWriter::new(sink, compression);
            write_front_matter(&mut archive, &front_matter_extension)?;
            Ok(archive)
        })
        .await
        .inspect_err(|e| {
            tracing::error!(error = %e, "Export aborted: could not write front matter");
        })?;
        self.event_tx.send(ExportEvent::Started { candidates }).ok();

        let scope = cancel.child_token();
        let deadline_hit = Arc::new(AtomicBool::new(false));
        let deadline_watcher = self
            .config
            .export_deadline
            .map(|after| spawn_deadline_watcher(after, scope.clone(), Arc::clone(&deadline_hit)));

        let ctx = TaskContext {
            fetcher: Arc::clone(&self.fetcher),
            retry: Arc::clone(&self.retry),
            fetch_timeout: self.config.fetch_timeout,
            state: Arc::new(Mutex::new(ExportState {
                archive,
                metadata: MetadataAggregator::new(),
                written: Vec::with_capacity(candidates),
            })),
            scope: scope.clone(),
            event_tx: self.event_tx.clone(),
        };

        // Phase 2: sequential serial assignment, bounded fan-out
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut tasks: JoinSet<Result<TaskOutcome>> = JoinSet::new();
        let mut skipped = Vec::new();
        let mut serial: u32 = 0;
        let mut fatal: Option<Error> = None;

        for image in &images {
            let job = match PlannedImage::plan(image, kind, serial + 1, &extension) {
                Ok(job) => job,
                Err(e) => match skip_image(&self.event_tx, None, &image.key, e) {
                    Ok(skip) => {
                        skipped.push(skip);
                        continue;
                    }
                    Err(e) => {
                        fatal = Some(e);
                        scope.cancel();
                        break;
                    }
                },
            };
            serial = job.serial;

            let permit = tokio::select! {
                biased;
                _ = scope.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        fatal = Some(Error::TaskFailed(format!("fetch slots unavailable: {e}")));
                        scope.cancel();
                        break;
                    }
                },
            };

            tasks.spawn(run_image_task(job, ctx.clone(), permit));
        }

        // Phase 3: join barrier
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(TaskOutcome::Written)) | Ok(Ok(TaskOutcome::Cancelled)) => {}
                Ok(Ok(TaskOutcome::Skipped(skip))) => skipped.push(skip),
                Ok(Err(e)) => {
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    scope.cancel();
                    fatal.get_or_insert(Error::TaskFailed(e.to_string()));
                }
            }
        }

        if let Some(watcher) = deadline_watcher {
            watcher.abort();
        }
        if let Some(e) = fatal {
            tracing::error!(error = %e, serials_assigned = serial, "Export aborted: archive is incomplete and will not be delivered");
            return Err(e);
        }
        if deadline_hit.load(Ordering::SeqCst) {
            let after = self.config.export_deadline.unwrap_or_default();
            tracing::error!(?after, "Export aborted: deadline exceeded");
            return Err(Error::DeadlineExceeded { after });
        }
        if scope.is_cancelled() {
            tracing::warn!(serials_assigned = serial, "Export aborted: cancelled by caller");
            return Err(Error::Cancelled);
        }

        // Phase 4: every task has joined; the context holds the last reference
        let TaskContext { state, .. } = ctx;
        let ExportState {
            mut archive,
            metadata,
            written,
        } = Arc::try_unwrap(state)
            .map_err(|_| Error::TaskFailed("archive still shared after join".to_string()))?
            .into_inner();
        let groups = metadata.counts();
        let (documents, archive) = run_blocking(move || {
            let documents = metadata.write_all(&mut archive).inspect_err(|e| {
                tracing::error!(error = %e, "Export aborted: could not write metadata");
            })?;
            let sink = archive.finish().inspect_err(|e| {
                tracing::error!(error = %e, "Export aborted: could not finalize archive");
            })?;
            Ok((documents, sink))
        })
        .await?;
        for (group, records) in documents {
            self.event_tx
                .send(ExportEvent::MetadataWritten { group, records })
                .ok();
        }

        skipped.sort_by_key(|s| s.serial);
        let report = ExportReport {
            candidates,
            serials_assigned: serial,
            written,
            skipped,
            groups,
        };

        if report.is_complete() {
            tracing::info!(written = report.written.len(), "Export completed");
        } else {
            tracing::warn!(
                written = report.written.len(),
                skipped = report.skipped.len(),
                candidates,
                "Export completed with missing entries"
            );
        }
        self.event_tx
            .send(ExportEvent::Finished {
                written: report.written.len(),
                skipped: report.skipped.len(),
            })
            .ok();

        Ok(ExportOutcome { archive, report })
    }
}

/// Run synchronous archive I/O on the blocking thread pool
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::TaskFailed(format!("archive writer failed: {e}")))?
}

/// Turn a per-image failure into a skip; errors fatal to the export pass through
fn skip_image(
    event_tx: &broadcast::Sender<ExportEvent>,
    serial: Option<u32>,
    key: &str,
    error: Error,
) -> Result<SkippedImage> {
    if error.is_fatal_to_export() {
        return Err(error);
    }
    tracing::warn!(?serial, %key, error = %error, "Image skipped, export continues");
    let reason = error.to_string();
    event_tx
        .send(ExportEvent::ImageSkipped {
            serial,
            key: key.to_string(),
            reason: reason.clone(),
        })
        .ok();
    Ok(SkippedImage {
        serial,
        key: key.to_string(),
        reason,
    })
}

fn spawn_deadline_watcher(
    after: Duration,
    scope: CancellationToken,
    deadline_hit: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(after) => {
                deadline_hit.store(true, Ordering::SeqCst);
                scope.cancel();
            }
            _ = scope.cancelled() => {}
        }
    })
}

/// Fetch one blob, honoring the retry policy, the timeout and cancellation
async fn fetch_blob<W: Write + Seek>(
    ctx: &TaskContext<W>,
    blob: &BlobRef,
) -> std::result::Result<Vec<u8>, FetchError> {
    let fetcher = &ctx.fetcher;
    let scope = &ctx.scope;
    let attempts = fetch_with_retry(&ctx.retry, move || fetcher.fetch(blob, scope));

    let timed = async {
        match ctx.fetch_timeout {
            Some(after) => tokio::time::timeout(after, attempts)
                .await
                .unwrap_or_else(|_| {
                    Err(FetchError::Timeout {
                        reference: blob.to_string(),
                        after,
                    })
                }),
            None => attempts.await,
        }
    };

    tokio::select! {
        biased;
        _ = scope.cancelled() => Err(FetchError::Cancelled),
        result = timed => result,
    }
}

/// Retrieval task for one image; holds its fetch slot until it returns
async fn run_image_task<W: Write + Seek + Send + 'static>(
    job: PlannedImage,
    ctx: TaskContext<W>,
    _permit: OwnedSemaphorePermit,
) -> Result<TaskOutcome> {
    let bytes = match fetch_blob(&ctx, &job.blob).await {
        Ok(bytes) => bytes,
        Err(_) if ctx.scope.is_cancelled() => return Ok(TaskOutcome::Cancelled),
        Err(e) => {
            return skip_image(&ctx.event_tx, Some(job.serial), &job.key, e.into())
                .map(TaskOutcome::Skipped);
        }
    };

    let mut state = Arc::clone(&ctx.state).lock_owned().await;
    if ctx.scope.is_cancelled() {
        return Ok(TaskOutcome::Cancelled);
    }
    let size = bytes.len();
    let written = run_blocking(move || {
        state.archive.write_entry(&job.path, &bytes)?;
        state.metadata.record(
            &job.group,
            MetadataRecord {
                file_name: job.file_name,
                key: job.key.clone(),
                diagnosis: job.diagnosis,
            },
        );
        let entry = WrittenEntry {
            serial: job.serial,
            key: job.key,
            path: job.path,
        };
        state.written.push(entry.clone());
        Ok(entry)
    })
    .await;
    let entry = match written {
        Ok(entry) => entry,
        Err(e) => {
            ctx.scope.cancel();
            return Err(e);
        }
    };

    tracing::debug!(serial = entry.serial, path = %entry.path, bytes = size, "Entry written");
    ctx.event_tx
        .send(ExportEvent::EntryWritten {
            serial: entry.serial,
            path: entry.path,
        })
        .ok();
    Ok(TaskOutcome::Written)
}

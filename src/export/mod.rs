//! Dataset export pipeline split into focused submodules.
//!
//! - [`coordinator`] - Bounded-concurrency retrieval and serialized archive writes
//! - [`archive`] - Single-writer ZIP archive wrapper
//! - [`metadata`] - Per-group metadata records and documents
//! - [`front_matter`] - README and naming-convention documents
//!
//! [`DatasetExporter`] ties a [`StudyRepository`] to an [`ExportCoordinator`]
//! and shapes the result for the layer that answers the download request.

pub mod archive;
pub mod coordinator;
pub mod front_matter;
pub mod metadata;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

pub use archive::{ArchiveWriter, EntryWriter};
pub use coordinator::{ExportCoordinator, ExportOutcome, ExportReport, SkippedImage, WrittenEntry};
pub use metadata::{MetadataAggregator, MetadataRecord};

use std::collections::HashMap;
use std::io::{Seek, Write};
use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher;
use crate::filter::{StudyFilter, StudyFilterBuilder};
use crate::repository::StudyRepository;
use crate::types::{BinaryKind, ExportEvent};

/// Query parameter selecting the binary kind
pub const PARAM_TYPE: &str = "type";

/// MIME type of the delivered archive
pub const CONTENT_TYPE_ZIP: &str = "application/zip";

/// A validated export request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportRequest {
    /// Binary variant to export
    pub kind: BinaryKind,
    /// Image selection criteria
    pub filter: StudyFilter,
}

impl ExportRequest {
    /// Build a request from raw query parameters
    ///
    /// `type` accepts `dcm`/`original` and `jpg`/`distributable`. The filter
    /// parameters are validated by [`StudyFilterBuilder`].
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self> {
        let raw = params
            .get(PARAM_TYPE)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::MissingRequiredField {
                field: PARAM_TYPE.to_string(),
            })?;
        let kind = BinaryKind::from_param(raw).ok_or_else(|| Error::InvalidField {
            field: PARAM_TYPE.to_string(),
            value: raw.to_string(),
            reason: "expected dcm or jpg".to_string(),
        })?;
        let filter = StudyFilterBuilder::from_params(params).build()?;
        Ok(Self { kind, filter })
    }
}

/// A finished archive ready to be streamed back to the requester
#[derive(Debug)]
pub struct ExportResponse<W> {
    /// Always `application/zip`
    pub content_type: &'static str,
    /// `attachment; filename=...` header value
    pub content_disposition: String,
    /// Suggested download filename
    pub file_name: String,
    /// The sink holding the finalized archive
    pub body: W,
    /// What went into the archive and what was left out
    pub report: ExportReport,
}

/// Download filename: `dataset_{dcm|jpg}_{YYYYMMDD_HHMMSS}.zip`
pub fn download_file_name(kind: BinaryKind, now: DateTime<Local>) -> String {
    format!("dataset_{}_{}.zip", kind.label(), now.format("%Y%m%d_%H%M%S"))
}

/// Entry point for dataset exports (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct DatasetExporter {
    repository: Arc<dyn StudyRepository>,
    coordinator: ExportCoordinator,
}

impl DatasetExporter {
    /// Create an exporter from its parts
    pub fn new(repository: Arc<dyn StudyRepository>, coordinator: ExportCoordinator) -> Self {
        Self {
            repository,
            coordinator,
        }
    }

    /// Validate `config` and build an exporter with the fetcher it describes
    pub fn from_config(config: &Config, repository: Arc<dyn StudyRepository>) -> Result<Self> {
        config.validate()?;
        let fetcher = fetcher::from_config(&config.blob_store)?;
        let coordinator =
            ExportCoordinator::new(fetcher, config.export.clone(), config.retry.clone());
        Ok(Self::new(repository, coordinator))
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<ExportEvent> {
        self.coordinator.subscribe()
    }

    /// The coordinator used for exports
    pub fn coordinator(&self) -> &ExportCoordinator {
        &self.coordinator
    }

    /// Export the images selected by `request` into `sink`
    pub async fn export<W>(
        &self,
        request: &ExportRequest,
        sink: W,
        cancel: CancellationToken,
    ) -> Result<ExportResponse<W>>
    where
        W: Write + Seek + Send + 'static,
    {
        let images = self.repository.find_eligible(&request.filter).await?;
        tracing::debug!(filter = %request.filter, images = images.len(), "Eligible images selected");

        let outcome = self
            .coordinator
            .export(images, sink, request.kind, cancel)
            .await?;

        let file_name = download_file_name(request.kind, Local::now());
        Ok(ExportResponse {
            content_type: CONTENT_TYPE_ZIP,
            content_disposition: format!("attachment; filename={file_name}"),
            file_name,
            body: outcome.archive,
            report: outcome.report,
        })
    }

    /// Validate raw query parameters, then export
    ///
    /// Invalid parameters fail before the repository or blob store is touched.
    pub async fn export_query<W>(
        &self,
        params: &HashMap<String, String>,
        sink: W,
        cancel: CancellationToken,
    ) -> Result<ExportResponse<W>>
    where
        W: Write + Seek + Send + 'static,
    {
        let request = ExportRequest::from_query(params).inspect_err(|e| {
            tracing::warn!(error = %e, "Rejected export request");
        })?;
        self.export(&request, sink, cancel).await
    }
}

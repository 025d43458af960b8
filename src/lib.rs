//! # dataset-export
//!
//! Bulk export of anonymized medical-imaging studies as a single ZIP dataset.
//!
//! ## Design Philosophy
//!
//! dataset-export is designed to be:
//! - **Bounded** - Blob retrieval fans out, but never beyond the configured number of fetch slots
//! - **Single-writer** - Archive entries are created one at a time behind one critical section
//! - **Tolerant** - A missing blob costs one entry, not the whole dataset
//! - **Event-driven** - Consumers subscribe to progress events, no polling required
//!
//! ## Archive layout
//!
//! ```text
//! README.txt
//! metadatos/nameconvention.txt
//! imagenes/{group}/{key}_{serial:04}.{ext}
//! metadata/{group}_Metadata.json
//! ```
//!
//! `group` is the first four characters of the classification key (study type
//! and body region).
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use dataset_export::{CatalogRepository, Config, DatasetExporter};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.blob_store.root_dir = Some("/var/lib/blobs".into());
//!
//!     let catalog = CatalogRepository::load("catalog.json").await?;
//!     let exporter = DatasetExporter::from_config(&config, Arc::new(catalog))?;
//!
//!     // Subscribe to events
//!     let mut events = exporter.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let params = HashMap::from([
//!         ("type".to_string(), "dcm".to_string()),
//!         ("tipoEstudio".to_string(), "01".to_string()),
//!     ]);
//!     let file = std::fs::File::create("dataset.zip")?;
//!     let response = exporter
//!         .export_query(&params, file, CancellationToken::new())
//!         .await?;
//!     println!("{} written", response.file_name);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Image classification key codec
pub mod classification;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Export pipeline: coordinator, archive, metadata
pub mod export;
/// Blob retrieval adapters
pub mod fetcher;
/// Study selection criteria
pub mod filter;
/// Study storage seam
pub mod repository;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types
pub mod types;

pub use classification::{Field, KeyFields};
pub use config::{ArchiveCompression, BlobStoreConfig, Config, ExportConfig, RetryConfig};
pub use error::{Error, FetchError, Result, ToHttpStatus};
pub use export::{
    DatasetExporter, ExportCoordinator, ExportOutcome, ExportReport, ExportRequest,
    ExportResponse,
};
pub use fetcher::{BlobFetcher, HttpBlobFetcher, LocalBlobFetcher};
pub use filter::{StudyFilter, StudyFilterBuilder};
pub use repository::{CatalogRepository, StudyRepository};
pub use types::{
    BinaryKind, BlobRef, Diagnosis, DiagnosisMetadata, EligibleImage, ExportEvent, Image, Study,
    StudyStatus,
};

//! Core types for dataset-export

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference to an object stored in the blob store
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(pub String);

impl BlobRef {
    /// Create a new BlobRef
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Get the reference as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BlobRef {
    fn from(reference: &str) -> Self {
        Self(reference.to_string())
    }
}

impl std::fmt::Display for BlobRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which binary variant of an image is exported
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryKind {
    /// The clinical/original DICOM blob
    Original,
    /// The distributable rendition (e.g., JPEG)
    Distributable,
}

impl BinaryKind {
    /// Parse the `type` request parameter
    ///
    /// Accepts both the file-type spelling used by existing clients
    /// (`dcm`, `jpg`) and the variant names.
    pub fn from_param(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dcm" | "dicom" | "original" => Some(BinaryKind::Original),
            "jpg" | "jpeg" | "distributable" => Some(BinaryKind::Distributable),
            _ => None,
        }
    }

    /// Label used in the download filename
    pub fn label(&self) -> &'static str {
        match self {
            BinaryKind::Original => "dcm",
            BinaryKind::Distributable => "jpg",
        }
    }
}

/// Study lifecycle status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudyStatus {
    /// Received, awaiting review
    #[default]
    Pending,
    /// Reviewed and published
    Active,
    /// Rejected during review
    Rejected,
}

/// One binary asset belonging to a study
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// 11-character classification key
    pub key: String,
    /// Reference to the clinical/original blob
    #[serde(default)]
    pub original: Option<BlobRef>,
    /// Reference to the distributable blob
    #[serde(default)]
    pub distributable: Option<BlobRef>,
    /// Whether the anonymization step has run on this image
    #[serde(default)]
    pub anonymized: bool,
}

/// Clinical annotation attached to a study
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// Findings
    pub findings: String,
    /// Impression
    pub impression: String,
    /// Free-form observations
    #[serde(default)]
    pub observations: String,
    /// Reference to the issuing physician; never exported
    pub physician: String,
    /// Time the diagnosis was issued
    pub issued_at: DateTime<Utc>,
}

impl Diagnosis {
    /// Copy of this diagnosis without the physician-identifying field
    pub fn without_physician(&self) -> DiagnosisMetadata {
        DiagnosisMetadata {
            findings: self.findings.clone(),
            impression: self.impression.clone(),
            observations: self.observations.clone(),
            issued_at: self.issued_at,
        }
    }
}

/// Diagnosis as published in export metadata (no physician reference)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisMetadata {
    /// Findings
    #[serde(rename = "hallazgos")]
    pub findings: String,
    /// Impression
    #[serde(rename = "impresion")]
    pub impression: String,
    /// Free-form observations
    #[serde(rename = "observaciones")]
    pub observations: String,
    /// Time the diagnosis was issued
    #[serde(rename = "fecha")]
    pub issued_at: DateTime<Utc>,
}

/// One clinical case submission
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Study {
    /// Study identifier
    pub id: String,
    /// Donor reference
    #[serde(default)]
    pub donor: String,
    /// Integrity hash computed at intake
    #[serde(default)]
    pub hash: String,
    /// Lifecycle status
    #[serde(default)]
    pub status: StudyStatus,
    /// Images in intake order
    #[serde(default)]
    pub images: Vec<Image>,
    /// Diagnosis history (append-only)
    #[serde(default)]
    pub diagnoses: Vec<Diagnosis>,
}

impl Study {
    /// The diagnosis with the latest timestamp
    ///
    /// Ties resolve to the later entry in the history.
    pub fn most_recent_diagnosis(&self) -> Option<&Diagnosis> {
        self.diagnoses
            .iter()
            .reduce(|latest, d| if d.issued_at >= latest.issued_at { d } else { latest })
    }
}

/// An image selected for export, carrying what the coordinator needs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EligibleImage {
    /// Identifier of the parent study
    pub study_id: String,
    /// 11-character classification key
    pub key: String,
    /// Reference to the clinical/original blob
    pub original: Option<BlobRef>,
    /// Reference to the distributable blob
    pub distributable: Option<BlobRef>,
    /// Most recent diagnosis of the parent study, physician stripped
    pub diagnosis: Option<DiagnosisMetadata>,
}

impl EligibleImage {
    /// Build from a study and one of its images
    pub fn from_study(study: &Study, image: &Image) -> Self {
        Self {
            study_id: study.id.clone(),
            key: image.key.clone(),
            original: image.original.clone(),
            distributable: image.distributable.clone(),
            diagnosis: study.most_recent_diagnosis().map(Diagnosis::without_physician),
        }
    }

    /// The blob reference for the requested binary kind, if stored
    pub fn blob(&self, kind: BinaryKind) -> Option<&BlobRef> {
        match kind {
            BinaryKind::Original => self.original.as_ref(),
            BinaryKind::Distributable => self.distributable.as_ref(),
        }
    }
}

/// Progress events published while an export runs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExportEvent {
    /// Front matter written, fan-out starting
    Started {
        /// Number of candidate images handed to the coordinator
        candidates: usize,
    },
    /// An image entry was written to the archive
    EntryWritten {
        /// Serial assigned to the image
        serial: u32,
        /// Archive path of the entry
        path: String,
    },
    /// An image was left out of the archive
    ImageSkipped {
        /// Serial assigned to the image, if it got one
        serial: Option<u32>,
        /// Classification key of the image
        key: String,
        /// Why the image was skipped
        reason: String,
    },
    /// A per-group metadata document was written
    MetadataWritten {
        /// Group prefix
        group: String,
        /// Number of records in the document
        records: usize,
    },
    /// The archive was finalized
    Finished {
        /// Number of image entries written
        written: usize,
        /// Number of images skipped
        skipped: usize,
    },
}

//! Per-group metadata collected during an export.

use std::collections::BTreeMap;
use std::io::{Seek, Write};

use serde::{Deserialize, Serialize};

use super::archive::ArchiveWriter;
use crate::error::Result;
use crate::types::DiagnosisMetadata;

/// Metadata describing one exported image
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Filename of the entry inside `imagenes/{group}/`
    #[serde(rename = "nombreArchivo")]
    pub file_name: String,
    /// Classification key of the image
    #[serde(rename = "clave")]
    pub key: String,
    /// Most recent diagnosis of the parent study, without physician
    #[serde(rename = "diagnostico")]
    pub diagnosis: Option<DiagnosisMetadata>,
}

/// Archive path of a group's metadata document
pub fn metadata_path(group: &str) -> String {
    format!("metadata/{group}_Metadata.json")
}

/// Serialize `records` as an indented JSON array at `metadata/{group}_Metadata.json`
///
/// The caller must hold the archive lock.
pub fn write_metadata_group<W: Write + Seek>(
    archive: &mut ArchiveWriter<W>,
    group: &str,
    records: &[MetadataRecord],
) -> Result<()> {
    let body = serde_json::to_vec_pretty(records)?;
    archive.write_entry(&metadata_path(group), &body)
}

/// Collects metadata records by group prefix
///
/// Records keep insertion order within a group; groups are emitted in
/// ascending prefix order.
#[derive(Debug, Default)]
pub struct MetadataAggregator {
    groups: BTreeMap<String, Vec<MetadataRecord>>,
}

impl MetadataAggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to `group`
    pub fn record(&mut self, group: &str, record: MetadataRecord) {
        self.groups.entry(group.to_string()).or_default().push(record);
    }

    /// Records collected for `group`
    pub fn group(&self, group: &str) -> &[MetadataRecord] {
        self.groups.get(group).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of records per group
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.groups
            .iter()
            .map(|(group, records)| (group.clone(), records.len()))
            .collect()
    }

    /// Total number of records across all groups
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Whether no record has been collected
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Write one metadata document per group, returning `(group, records)` pairs
    ///
    /// The caller must hold the archive lock.
    pub fn write_all<W: Write + Seek>(
        &self,
        archive: &mut ArchiveWriter<W>,
    ) -> Result<Vec<(String, usize)>> {
        let mut written = Vec::with_capacity(self.groups.len());
        for (group, records) in &self.groups {
            write_metadata_group(archive, group, records)?;
            written.push((group.clone(), records.len()));
        }
        Ok(written)
    }
}

//! Study storage seam
//!
//! The export only needs one query: every image matching a filter, with the
//! parent study's most recent diagnosis attached. [`CatalogRepository`] serves
//! it from an in-memory catalog, typically loaded from a JSON file.

use std::path::Path;

use crate::error::{Error, Result};
use crate::filter::StudyFilter;
use crate::types::{EligibleImage, Study};

/// Source of studies eligible for export
#[async_trait::async_trait]
pub trait StudyRepository: Send + Sync {
    /// Images of active studies that are anonymized and whose key matches `filter`
    ///
    /// Images are returned in study order, then intake order within a study.
    async fn find_eligible(&self, filter: &StudyFilter) -> Result<Vec<EligibleImage>>;
}

/// In-memory study catalog
#[derive(Clone, Debug, Default)]
pub struct CatalogRepository {
    studies: Vec<Study>,
}

impl CatalogRepository {
    /// Create a catalog holding `studies`
    pub fn new(studies: Vec<Study>) -> Self {
        Self { studies }
    }

    /// Parse a catalog from a JSON array of studies
    pub fn from_json(json: &str) -> Result<Self> {
        let studies: Vec<Study> = serde_json::from_str(json)
            .map_err(|e| Error::Repository(format!("invalid study catalog: {e}")))?;
        Ok(Self::new(studies))
    }

    /// Load a catalog file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Repository(format!("cannot read catalog {}: {e}", path.display()))
        })?;
        let catalog = Self::from_json(&json)?;
        tracing::info!(path = %path.display(), studies = catalog.len(), "Loaded study catalog");
        Ok(catalog)
    }

    /// Studies in the catalog
    pub fn studies(&self) -> &[Study] {
        &self.studies
    }

    /// Number of studies
    pub fn len(&self) -> usize {
        self.studies.len()
    }

    /// Whether the catalog holds no study
    pub fn is_empty(&self) -> bool {
        self.studies.is_empty()
    }
}

#[async_trait::async_trait]
impl StudyRepository for CatalogRepository {
    async fn find_eligible(&self, filter: &StudyFilter) -> Result<Vec<EligibleImage>> {
        Ok(self
            .studies
            .iter()
            .flat_map(|study| filter.eligible_images(study))
            .collect())
    }
}

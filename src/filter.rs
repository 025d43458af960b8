//! Study selection predicate built from caller query parameters
//!
//! A [`StudyFilter`] selects images whose parent study is active, that have
//! been anonymized, and whose classification key matches positional
//! constraints: study type is mandatory, region and projection narrow the
//! match further.

use std::collections::HashMap;
use std::fmt;

use crate::classification::Field;
use crate::error::{Error, Result};
use crate::types::{EligibleImage, Image, Study, StudyStatus};

/// Query parameter carrying the study type (mandatory)
pub const PARAM_STUDY_TYPE: &str = "tipoEstudio";
/// Query parameter carrying the body region (optional)
pub const PARAM_REGION: &str = "region";
/// Query parameter carrying the projection (optional)
pub const PARAM_PROJECTION: &str = "proyeccion";

/// Builder for [`StudyFilter`]
#[derive(Clone, Debug, Default)]
pub struct StudyFilterBuilder {
    study_type: Option<String>,
    region: Option<String>,
    projection: Option<String>,
}

impl StudyFilterBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a builder from request query parameters
    ///
    /// Empty values are treated as absent.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let get = |name: &str| {
            params
                .get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            study_type: get(PARAM_STUDY_TYPE),
            region: get(PARAM_REGION),
            projection: get(PARAM_PROJECTION),
        }
    }

    /// Set the study type constraint
    pub fn study_type(mut self, code: impl Into<String>) -> Self {
        self.study_type = Some(code.into());
        self
    }

    /// Set the body region constraint
    pub fn region(mut self, code: impl Into<String>) -> Self {
        self.region = Some(code.into());
        self
    }

    /// Set the projection constraint
    pub fn projection(mut self, code: impl Into<String>) -> Self {
        self.projection = Some(code.into());
        self
    }

    /// Validate the constraints and produce the predicate
    ///
    /// Fails with [`Error::MissingRequiredField`] when no study type was given,
    /// and with [`Error::InvalidField`] when a code is not in its table.
    pub fn build(self) -> Result<StudyFilter> {
        let study_type = self.study_type.ok_or_else(|| Error::MissingRequiredField {
            field: PARAM_STUDY_TYPE.to_string(),
        })?;
        Field::StudyType.validate(&study_type)?;
        if let Some(region) = &self.region {
            Field::Region.validate(region)?;
        }
        if let Some(projection) = &self.projection {
            Field::Projection.validate(projection)?;
        }

        Ok(StudyFilter {
            study_type,
            region: self.region,
            projection: self.projection,
        })
    }
}

/// Selection predicate over studies and their images
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StudyFilter {
    study_type: String,
    region: Option<String>,
    projection: Option<String>,
}

impl StudyFilter {
    /// The mandatory study type code
    pub fn study_type(&self) -> &str {
        &self.study_type
    }

    /// The region code, if constrained
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// The projection code, if constrained
    pub fn projection(&self) -> Option<&str> {
        self.projection.as_deref()
    }

    fn constraints(&self) -> impl Iterator<Item = (Field, &str)> {
        [
            Some((Field::StudyType, self.study_type.as_str())),
            self.region.as_deref().map(|r| (Field::Region, r)),
            self.projection.as_deref().map(|p| (Field::Projection, p)),
        ]
        .into_iter()
        .flatten()
    }

    /// Whether a classification key satisfies every positional constraint
    pub fn matches_key(&self, key: &str) -> bool {
        self.constraints().all(|(field, code)| {
            key.get(field.offset()..field.offset() + field.width()) == Some(code)
        })
    }

    /// Whether an image is anonymized and its key matches
    pub fn matches_image(&self, image: &Image) -> bool {
        image.anonymized && self.matches_key(&image.key)
    }

    /// Whether a study is active and has at least one matching image
    pub fn matches_study(&self, study: &Study) -> bool {
        study.status == StudyStatus::Active && study.images.iter().any(|i| self.matches_image(i))
    }

    /// The matching images of a study, in intake order
    pub fn eligible_images(&self, study: &Study) -> Vec<EligibleImage> {
        if study.status != StudyStatus::Active {
            return Vec::new();
        }
        study
            .images
            .iter()
            .filter(|image| self.matches_image(image))
            .map(|image| EligibleImage::from_study(study, image))
            .collect()
    }

    /// Glob-style rendering of the key constraint (e.g., `01??05*`)
    pub fn key_pattern(&self) -> String {
        let mut pattern = self.study_type.clone();
        match (&self.region, &self.projection) {
            (Some(region), Some(projection)) => {
                pattern.push_str(region);
                pattern.push_str(projection);
            }
            (Some(region), None) => pattern.push_str(region),
            (None, Some(projection)) => {
                pattern.push_str("??");
                pattern.push_str(projection);
            }
            (None, None) => {}
        }
        pattern.push('*');
        pattern
    }
}

impl fmt::Display for StudyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status == active AND anonymized AND key ~ {}",
            self.key_pattern()
        )
    }
}

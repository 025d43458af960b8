//! Study catalog and blob store fixtures

use std::path::Path;

use chrono::{TimeZone, Utc};
use dataset_export::{BlobRef, CatalogRepository, Diagnosis, Image, Study, StudyStatus};

/// Keys used by generated studies, cycling across three groups
pub const KEYS: [&str; 3] = ["01020501106", "01020200015", "01030101121"];

/// Physician reference placed on every diagnosis; must never be exported
pub const PHYSICIAN: &str = "dr-ramirez-7731";

/// Blob content for a reference
pub fn blob_content(reference: &str) -> Vec<u8> {
    format!("DICM:{reference}").into_bytes()
}

/// An active study with one anonymized image and two diagnoses
pub fn study(n: usize, key: &str) -> Study {
    Study {
        id: format!("study-{n:03}"),
        donor: format!("donor-{n}"),
        hash: format!("{n:064x}"),
        status: StudyStatus::Active,
        images: vec![Image {
            key: key.to_string(),
            original: Some(BlobRef::new(format!("orig-{n:03}"))),
            distributable: Some(BlobRef::new(format!("dist-{n:03}"))),
            anonymized: true,
        }],
        diagnoses: vec![
            Diagnosis {
                findings: format!("hallazgo inicial {n}"),
                impression: "pendiente".to_string(),
                observations: String::new(),
                physician: PHYSICIAN.to_string(),
                issued_at: Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap(),
            },
            Diagnosis {
                findings: format!("hallazgo final {n}"),
                impression: "sin alteraciones".to_string(),
                observations: "control en 6 meses".to_string(),
                physician: PHYSICIAN.to_string(),
                issued_at: Utc.with_ymd_and_hms(2024, 2, 20, 16, 45, 0).unwrap(),
            },
        ],
    }
}

/// `count` active studies of study type 01
pub fn studies(count: usize) -> Vec<Study> {
    (1..=count).map(|n| study(n, KEYS[n % KEYS.len()])).collect()
}

/// Catalog of `count` studies plus a few that must never be selected
pub fn catalog(count: usize) -> CatalogRepository {
    let mut all = studies(count);

    let mut pending = study(900, KEYS[0]);
    pending.status = StudyStatus::Pending;
    all.push(pending);

    let mut not_anonymized = study(901, KEYS[0]);
    not_anonymized.images[0].anonymized = false;
    all.push(not_anonymized);

    all.push(study(902, "02020501106"));

    CatalogRepository::new(all)
}

/// Write the original and distributable blobs of `studies` under `root`,
/// leaving out the original blobs of the study numbers in `missing`
pub fn write_blobs(root: &Path, studies: &[Study], missing: &[usize]) {
    for (i, study) in studies.iter().enumerate() {
        for image in &study.images {
            if let Some(reference) = &image.original {
                if !missing.contains(&(i + 1)) {
                    std::fs::write(root.join(reference.as_str()), blob_content(reference.as_str()))
                        .unwrap();
                }
            }
            if let Some(reference) = &image.distributable {
                std::fs::write(root.join(reference.as_str()), blob_content(reference.as_str()))
                    .unwrap();
            }
        }
    }
}

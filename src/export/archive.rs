//! Single-writer ZIP archive wrapper.
//!
//! The ZIP format has one writer cursor, so entries are created strictly one at
//! a time. [`ArchiveWriter`] performs no locking of its own: the export
//! coordinator owns the critical section and calls in while holding it.

use std::collections::HashSet;
use std::io::{Seek, Write};

use zip::ZipWriter;
use zip::write::FileOptions;

use crate::config::ArchiveCompression;
use crate::error::{Error, Result};

/// Stateful archive writer; not safe for concurrent use
pub struct ArchiveWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    options: FileOptions,
    entries: HashSet<String>,
}

/// Handle for streaming the content of the entry most recently created
pub struct EntryWriter<'a, W: Write + Seek> {
    zip: &'a mut ZipWriter<W>,
    path: String,
}

impl<W: Write + Seek> ArchiveWriter<W> {
    /// Start an archive on `sink`
    pub fn new(sink: W, compression: ArchiveCompression) -> Self {
        Self {
            zip: ZipWriter::new(sink),
            options: FileOptions::default()
                .compression_method(compression.method())
                .unix_permissions(0o644),
            entries: HashSet::new(),
        }
    }

    /// Create a new entry at `path`
    ///
    /// Fails with [`Error::ArchiveIo`] if the path was already used in this
    /// archive, is not a relative path, or the sink rejects the entry header.
    pub fn create_entry(&mut self, path: &str) -> Result<EntryWriter<'_, W>> {
        validate_entry_path(path)?;
        if self.entries.contains(path) {
            return Err(archive_error(path, "entry already exists"));
        }

        self.zip
            .start_file(path, self.options)
            .map_err(|e| archive_error(path, &e.to_string()))?;
        self.entries.insert(path.to_string());

        Ok(EntryWriter {
            zip: &mut self.zip,
            path: path.to_string(),
        })
    }

    /// Create an entry at `path` holding `contents`
    pub fn write_entry(&mut self, path: &str, contents: &[u8]) -> Result<()> {
        let mut entry = self.create_entry(path)?;
        entry
            .write_all(contents)
            .map_err(|e| archive_error(path, &e.to_string()))
    }

    /// Whether an entry exists at `path`
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains(path)
    }

    /// Number of entries created so far
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry has been created yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the central directory and hand back the sink
    pub fn finish(mut self) -> Result<W> {
        self.zip
            .finish()
            .map_err(|e| archive_error("<central directory>", &e.to_string()))
    }
}

impl<W: Write + Seek> EntryWriter<'_, W> {
    /// Archive path of this entry
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl<W: Write + Seek> Write for EntryWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.zip.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.zip.flush()
    }
}

fn validate_entry_path(path: &str) -> Result<()> {
    let bad = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|segment| segment.is_empty() || segment == "..");
    if bad {
        return Err(archive_error(path, "not a relative archive path"));
    }
    Ok(())
}

fn archive_error(path: &str, reason: &str) -> Error {
    Error::ArchiveIo {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    fn read_entry(bytes: Vec<u8>, path: &str) -> Vec<u8> {
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = zip.by_name(path).unwrap();
        let mut out = Vec::new();
        file.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn entries_are_readable_after_finish() {
        let mut archive = ArchiveWriter::new(Cursor::new(Vec::new()), ArchiveCompression::Deflated);
        archive.write_entry("README.txt", b"hello").unwrap();
        {
            let mut entry = archive.create_entry("imagenes/0102/a_0001.dcm").unwrap();
            assert_eq!(entry.path(), "imagenes/0102/a_0001.dcm");
            entry.write_all(b"DI").unwrap();
            entry.write_all(b"CM").unwrap();
        }
        assert_eq!(archive.len(), 2);

        let bytes = archive.finish().unwrap().into_inner();
        assert_eq!(read_entry(bytes.clone(), "README.txt"), b"hello");
        assert_eq!(read_entry(bytes, "imagenes/0102/a_0001.dcm"), b"DICM");
    }

    #[test]
    fn duplicate_path_is_an_archive_error() {
        let mut archive = ArchiveWriter::new(Cursor::new(Vec::new()), ArchiveCompression::Stored);
        archive.write_entry("metadata/0102_Metadata.json", b"[]").unwrap();

        let err = archive
            .write_entry("metadata/0102_Metadata.json", b"[]")
            .unwrap_err();
        match err {
            Error::ArchiveIo { path, reason } => {
                assert_eq!(path, "metadata/0102_Metadata.json");
                assert!(reason.contains("already exists"));
            }
            other => panic!("expected ArchiveIo, got {other:?}"),
        }
        assert!(archive.contains("metadata/0102_Metadata.json"));
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn unsafe_paths_are_refused() {
        let mut archive = ArchiveWriter::new(Cursor::new(Vec::new()), ArchiveCompression::Stored);
        for path in ["", "/abs", "a/../b", "a//b", "a\\b"] {
            assert!(
                matches!(archive.create_entry(path), Err(Error::ArchiveIo { .. })),
                "{path:?} should be refused"
            );
        }
        assert!(archive.is_empty());
    }
}

//! Archive inspection helpers

use std::io::{Read, Seek};

use serde_json::Value;

/// Every entry name of an archive, in the order entries were written
pub fn entry_names<R: Read + Seek>(reader: R) -> Vec<String> {
    let mut zip = zip::ZipArchive::new(reader).unwrap();
    (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .collect()
}

/// Content of one archive entry
pub fn read_entry<R: Read + Seek>(reader: R, path: &str) -> Vec<u8> {
    let mut zip = zip::ZipArchive::new(reader).unwrap();
    let mut file = zip.by_name(path).unwrap();
    let mut out = Vec::new();
    file.read_to_end(&mut out).unwrap();
    out
}

/// Parsed metadata document of a group
pub fn read_metadata<R: Read + Seek>(reader: R, group: &str) -> Vec<Value> {
    let body = read_entry(reader, &format!("metadata/{group}_Metadata.json"));
    serde_json::from_slice(&body).unwrap()
}

/// Image entries (`imagenes/...`) of an archive
pub fn image_entries(names: &[String]) -> Vec<&str> {
    names
        .iter()
        .filter(|n| n.starts_with("imagenes/"))
        .map(String::as_str)
        .collect()
}

//! # Archive Extraction
//!
//! Reads `composer.json` (and an optional `README.md`) out of an uploaded
//! zip archive. Archives are untrusted input:
//!
//! - at most [`MAX_ARCHIVE_ENTRIES`] entries are accepted;
//! - entries are located from the central directory without decompressing;
//! - the descriptor and README are read through a hard byte cap regardless
//!   of the sizes the archive declares;
//! - nothing in the archive is executed or interpreted beyond JSON parsing.

use std::io::{Cursor, Read};

use depot_registry::ExtractError;
use zip::ZipArchive;

use crate::metadata::{is_valid_name, Metadata};

/// Maximum number of entries in an uploaded archive.
pub const MAX_ARCHIVE_ENTRIES: usize = 50_000;

/// Byte cap for `composer.json` and `README.md`.
pub const MAX_FILE_SIZE: u64 = 1024 * 1024;

const DESCRIPTOR_NAME: &str = "composer.json";
const README_NAME: &str = "readme.md";

/// A parsed `composer.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposerPackage {
    pub name: String,
    /// The descriptor's own `version` field, unnormalized.
    pub version: Option<String>,
    pub metadata: Metadata,
}

#[derive(serde::Deserialize)]
struct Descriptor {
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(flatten)]
    metadata: Metadata,
}

fn invalid(message: impl Into<String>) -> ExtractError {
    ExtractError::InvalidPackage(message.into())
}

/// Split an entry path into `(directory, basename)` and its depth.
///
/// `composer.json` has depth 0, `pkg/composer.json` depth 1.
fn split_entry(name: &str) -> (&str, &str, usize) {
    let name = name.trim_start_matches("./");
    let depth = name.matches('/').count();
    match name.rfind('/') {
        Some(at) => (&name[..at], &name[at + 1..], depth),
        None => ("", name, depth),
    }
}

/// Read at most `limit` bytes; `Ok(None)` if the entry is longer.
fn read_capped(reader: impl Read, limit: u64) -> std::io::Result<Option<Vec<u8>>> {
    let mut buf = Vec::new();
    reader.take(limit + 1).read_to_end(&mut buf)?;
    if buf.len() as u64 > limit {
        return Ok(None);
    }
    Ok(Some(buf))
}

/// Extract package metadata from zip archive bytes.
pub fn parse_archive(data: &[u8]) -> Result<ComposerPackage, ExtractError> {
    let mut archive = ZipArchive::new(Cursor::new(data))
        .map_err(|e| invalid(format!("cannot open archive: {e}")))?;
    if archive.len() > MAX_ARCHIVE_ENTRIES {
        return Err(invalid(format!(
            "archive has too many entries ({}), max allowed is {MAX_ARCHIVE_ENTRIES}",
            archive.len()
        )));
    }

    let mut descriptors: Vec<(usize, String)> = Vec::new();
    let mut readmes: Vec<(usize, String)> = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index_raw(index)
            .map_err(|e| invalid(format!("unreadable archive entry: {e}")))?;
        if entry.is_dir() {
            continue;
        }
        let (dir, base, depth) = split_entry(entry.name());
        if depth > 1 {
            continue;
        }
        if base.eq_ignore_ascii_case(DESCRIPTOR_NAME) {
            descriptors.push((index, dir.to_string()));
        } else if base.eq_ignore_ascii_case(README_NAME) {
            readmes.push((index, dir.to_string()));
        }
    }

    let (descriptor_index, descriptor_dir) = match descriptors.len() {
        0 => return Err(invalid("composer.json not found")),
        1 => descriptors.remove(0),
        n => {
            return Err(invalid(format!(
                "archive contains {n} composer.json files, expected exactly one"
            )))
        }
    };

    let raw = {
        let entry = archive
            .by_index(descriptor_index)
            .map_err(|e| invalid(format!("cannot read composer.json: {e}")))?;
        read_capped(entry, MAX_FILE_SIZE)
            .map_err(|e| invalid(format!("cannot read composer.json: {e}")))?
            .ok_or_else(|| invalid(format!("composer.json exceeds {MAX_FILE_SIZE} bytes")))?
    };
    let mut package = parse_descriptor(&raw)?;

    if let Some((readme_index, _)) = readmes.iter().find(|(_, dir)| *dir == descriptor_dir) {
        package.metadata.readme = read_readme(&mut archive, *readme_index);
    }

    Ok(package)
}

/// README problems never fail an upload; an oversized README is truncated.
fn read_readme(archive: &mut ZipArchive<Cursor<&[u8]>>, index: usize) -> Option<String> {
    let entry = match archive.by_index(index) {
        Ok(entry) => entry,
        Err(e) => {
            tracing::debug!(error = %e, "skipping unreadable README.md");
            return None;
        }
    };
    let mut buf = Vec::new();
    if let Err(e) = entry.take(MAX_FILE_SIZE).read_to_end(&mut buf) {
        tracing::debug!(error = %e, "skipping unreadable README.md");
        return None;
    }
    Some(String::from_utf8_lossy(&buf).into_owned())
}

/// Parse and validate `composer.json` contents.
pub fn parse_descriptor(raw: &[u8]) -> Result<ComposerPackage, ExtractError> {
    let value: serde_json::Value = serde_json::from_slice(raw)
        .map_err(|e| invalid(format!("composer.json is not valid JSON: {e}")))?;
    if !value.is_object() {
        return Err(invalid("composer.json must be a JSON object"));
    }
    let descriptor: Descriptor = serde_json::from_value(value)
        .map_err(|e| invalid(format!("malformed composer.json: {e}")))?;

    let name = descriptor
        .name
        .ok_or_else(|| invalid("composer.json has no name"))?;
    if !is_valid_name(&name) {
        return Err(invalid(format!("invalid package name {name:?}")));
    }
    if descriptor
        .metadata
        .authors
        .iter()
        .any(|a| a.name.trim().is_empty())
    {
        return Err(invalid("every author needs a name"));
    }

    Ok(ComposerPackage {
        name,
        version: descriptor.version.filter(|v| !v.trim().is_empty()),
        metadata: descriptor.metadata,
    })
}

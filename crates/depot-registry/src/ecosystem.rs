//! # Ecosystem Contract
//!
//! Each package ecosystem (Composer today) implements [`Ecosystem`] to turn
//! an uploaded archive into catalog metadata. The registry core never looks
//! inside an archive itself.

use std::collections::BTreeMap;

use depot_core::PackageType;
use thiserror::Error;

/// Metadata pulled out of an uploaded archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPackage {
    /// Package name as declared by the archive's descriptor.
    pub name: String,
    /// Version declared inside the archive, if any.
    pub version: Option<String>,
    /// Ecosystem-specific metadata stored verbatim on the version.
    pub metadata: serde_json::Value,
    /// Searchable properties stored on the version.
    pub properties: BTreeMap<String, String>,
}

/// Errors raised while reading an upload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The archive or its descriptor is malformed.
    #[error("invalid package: {0}")]
    InvalidPackage(String),

    /// The version string is not acceptable to the ecosystem.
    #[error("invalid version: {0}")]
    InvalidVersion(String),
}

/// A package ecosystem the registry can host.
pub trait Ecosystem: Send + Sync {
    fn package_type(&self) -> PackageType;

    /// Read an archive's descriptor. Must not execute archive contents.
    fn extract(&self, archive: &[u8]) -> Result<ExtractedPackage, ExtractError>;

    /// Canonical form of a version string.
    fn normalize_version(&self, raw: &str) -> Result<String, ExtractError>;

    /// Name of the lead file stored for `name` at `version`.
    fn lead_file_name(&self, name: &str, version: &str) -> String;
}

//! # Catalog Records
//!
//! The Package → Version → File graph. Records are plain data; all
//! invariants (uniqueness, immutability) are enforced by [`crate::Catalog`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use depot_core::{BlobDigest, BlobHashes, FileId, OwnerName, PackageId, PackageType, VersionId};
use serde::{Deserialize, Serialize};

/// A named package within one owner's namespace for one ecosystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub owner: OwnerName,
    pub package_type: PackageType,
    /// Name as first uploaded.
    pub name: String,
    pub lower_name: String,
    pub created_at: DateTime<Utc>,
}

impl Package {
    pub fn key(&self) -> PackageKey {
        PackageKey::new(&self.owner, self.package_type, &self.name)
    }
}

/// Uniqueness key of a package: owner, ecosystem and lower-cased name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageKey {
    pub owner: String,
    pub package_type: PackageType,
    pub lower_name: String,
}

impl PackageKey {
    pub fn new(owner: &OwnerName, package_type: PackageType, name: &str) -> Self {
        Self {
            owner: owner.lower(),
            package_type,
            lower_name: name.to_lowercase(),
        }
    }
}

/// One immutable version of a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageVersion {
    pub id: VersionId,
    pub package_id: PackageId,
    pub version: String,
    pub lower_version: String,
    /// Ecosystem-specific metadata captured at upload.
    pub metadata: serde_json::Value,
    /// Searchable string properties, e.g. `composer.type`.
    pub properties: BTreeMap<String, String>,
    pub download_count: u64,
    pub created_at: DateTime<Utc>,
}

/// A file attached to a version, backed by one blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageFile {
    pub id: FileId,
    pub version_id: VersionId,
    pub name: String,
    pub lower_name: String,
    pub size: u64,
    /// The primary artifact of the version.
    pub is_lead: bool,
    pub blob_digest: BlobDigest,
    pub hashes: BlobHashes,
    pub created_at: DateTime<Utc>,
}

/// A version together with its package and files.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionDescriptor {
    pub package: Package,
    pub version: PackageVersion,
    pub files: Vec<PackageFile>,
}

impl VersionDescriptor {
    /// Look up a file by name, case-insensitively.
    pub fn file(&self, name: &str) -> Option<&PackageFile> {
        let lower = name.to_lowercase();
        self.files.iter().find(|f| f.lower_name == lower)
    }

    /// The lead file, if the version has one.
    pub fn lead_file(&self) -> Option<&PackageFile> {
        self.files.iter().find(|f| f.is_lead)
    }
}

/// Everything needed to create a version in one commit.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub owner: OwnerName,
    pub package_type: PackageType,
    pub name: String,
    pub version: String,
    pub metadata: serde_json::Value,
    pub properties: BTreeMap<String, String>,
    pub files: Vec<NewFile>,
}

/// A file to attach to a new version. The blob must already be stored.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub name: String,
    pub is_lead: bool,
    pub size: u64,
    pub blob_digest: BlobDigest,
    pub hashes: BlobHashes,
}

//! # Identity Newtypes
//!
//! Newtype wrappers for catalog identifiers and owner namespaces. The
//! distinct types keep a `VersionId` from being handed to an API expecting a
//! `PackageId`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Maximum length of an owner name.
const MAX_OWNER_LEN: usize = 40;

/// Unique identifier for a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(pub Uuid);

/// Unique identifier for a package version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(pub Uuid);

/// Unique identifier for a file attached to a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub Uuid);

macro_rules! uuid_id {
    ($ty:ident, $prefix:literal) => {
        impl $ty {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

uuid_id!(PackageId, "package");
uuid_id!(VersionId, "version");
uuid_id!(FileId, "file");

/// The namespace owner packages are published under.
///
/// Owners are resolved by an external identity provider; the registry only
/// needs a stable, URL-safe name. Comparison between owners is
/// case-insensitive via [`OwnerName::lower`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerName(String);

impl OwnerName {
    /// Validate an owner name: 1-40 chars of `[A-Za-z0-9_.-]`, starting alphanumeric.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        let mut chars = name.chars();
        let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphanumeric());
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        if !valid_start || !valid_rest || name.len() > MAX_OWNER_LEN {
            return Err(ValidationError::InvalidOwner(name));
        }
        Ok(Self(name))
    }

    /// The name as given.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased name used for lookups.
    pub fn lower(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    /// Case-insensitive equality against a raw name.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl TryFrom<String> for OwnerName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OwnerName> for String {
    fn from(value: OwnerName) -> Self {
        value.0
    }
}

impl std::fmt::Display for OwnerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Package ecosystem.
///
/// Each variant has one `Ecosystem` implementation providing descriptor
/// parsing. Adding an ecosystem forces every exhaustive `match` to handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageType {
    /// PHP packages served to the Composer client.
    Composer,
}

impl PackageType {
    /// Stable identifier used in storage and URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Composer => "composer",
        }
    }
}

impl std::str::FromStr for PackageType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "composer" => Ok(Self::Composer),
            other => Err(ValidationError::UnknownPackageType(other.to_string())),
        }
    }
}

impl std::fmt::Display for PackageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

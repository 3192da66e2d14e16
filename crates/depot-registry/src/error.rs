//! # Registry Errors

use depot_blob::BlobError;
use depot_catalog::CatalogError;
use thiserror::Error;

use crate::ecosystem::ExtractError;

/// Errors from registry operations, grouped by how a client should react.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The request itself is unusable (missing or malformed version).
    #[error("{0}")]
    BadRequest(String),

    /// The uploaded archive could not be read as a package.
    #[error("{0}")]
    InvalidPackage(String),

    /// The package version already exists.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    /// Storage or database failure. Not safe to show to clients.
    #[error("{0}")]
    Internal(String),
}

impl From<ExtractError> for RegistryError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::InvalidPackage(msg) => Self::InvalidPackage(msg),
            ExtractError::InvalidVersion(msg) => Self::BadRequest(format!("invalid version: {msg}")),
        }
    }
}

impl From<CatalogError> for RegistryError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Conflict { .. } => Self::Conflict(err.to_string()),
            CatalogError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            CatalogError::Database(_) | CatalogError::Corrupt(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<BlobError> for RegistryError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound(_) => Self::NotFound("package file content not found".to_string()),
            BlobError::Integrity { .. } | BlobError::Io(_) => Self::Internal(err.to_string()),
        }
    }
}

//! # Catalog Errors

use thiserror::Error;

/// Errors from catalog operations.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The package version already exists.
    #[error("{package} version {version} already exists")]
    Conflict { package: String, version: String },

    /// No matching record.
    #[error("{0} not found")]
    NotFound(String),

    /// The database rejected or failed the operation.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A persisted row could not be mapped back to a record.
    #[error("corrupt catalog row: {0}")]
    Corrupt(String),
}

impl CatalogError {
    pub(crate) fn conflict(package: &str, version: &str) -> Self {
        Self::Conflict {
            package: package.to_string(),
            version: version.to_string(),
        }
    }
}

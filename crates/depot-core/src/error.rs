//! # Validation Errors
//!
//! Errors raised while constructing validated identifiers and digests.

use thiserror::Error;

/// A value failed validation on construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Owner names must be 1-40 chars of `[A-Za-z0-9_.-]`, starting alphanumeric.
    #[error("invalid owner name: {0:?}")]
    InvalidOwner(String),

    /// Unknown ecosystem identifier.
    #[error("unknown package type: {0:?}")]
    UnknownPackageType(String),

    /// Digest string was not 64 hex characters.
    #[error("invalid digest: {0}")]
    InvalidDigest(String),
}

//! # Blob Store Errors

use depot_core::BlobDigest;
use thiserror::Error;

/// Errors from blob store operations.
#[derive(Error, Debug)]
pub enum BlobError {
    /// No blob is stored under the digest.
    #[error("blob not found: {0}")]
    NotFound(BlobDigest),

    /// Stored bytes no longer hash to their digest.
    #[error("integrity violation: blob {expected} hashes to {actual}")]
    Integrity {
        expected: BlobDigest,
        actual: BlobDigest,
    },

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_digest() {
        let digest = BlobDigest::of(b"x");
        let err = BlobError::NotFound(digest);
        assert!(err.to_string().contains(&digest.to_hex()));
    }

    #[test]
    fn io_error_from_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read only");
        let err = BlobError::from(io_err);
        assert!(err.to_string().contains("read only"));
    }
}

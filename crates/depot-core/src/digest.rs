//! # Blob Digests
//!
//! [`BlobDigest`] is the SHA-256 of a blob's raw bytes and is the only key
//! the blob store is addressed by. [`BlobHashes`] carries every checksum a
//! protocol adapter may need to publish (Composer publishes SHA-1), computed
//! in the same pass so that the storage key and the client-facing checksums
//! always describe the same bytes.

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::ValidationError;

/// SHA-256 digest of blob content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobDigest(#[serde(with = "hex")] [u8; 32]);

impl BlobDigest {
    /// Compute the digest of `data`.
    pub fn of(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hash);
        Self(bytes)
    }

    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a 64 character hex string (either case).
    pub fn from_hex(s: &str) -> Result<Self, ValidationError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut bytes)
            .map_err(|e| ValidationError::InvalidDigest(format!("{s:?}: {e}")))?;
        Ok(Self(bytes))
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for BlobDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sha256:{}", self.to_hex())
    }
}

impl std::fmt::Debug for BlobDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlobDigest({})", self.to_hex())
    }
}

/// Hex checksums of a blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobHashes {
    pub sha1: String,
    pub sha256: String,
}

impl BlobHashes {
    /// Hash `data` once with SHA-1 and SHA-256.
    ///
    /// Returns the storage digest together with the hex checksums.
    pub fn compute(data: &[u8]) -> (BlobDigest, Self) {
        let mut sha1 = Sha1::new();
        let mut sha256 = Sha256::new();
        for chunk in data.chunks(64 * 1024) {
            sha1.update(chunk);
            sha256.update(chunk);
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&sha256.finalize());
        let digest = BlobDigest(bytes);
        let hashes = Self {
            sha1: hex::encode(sha1.finalize()),
            sha256: digest.to_hex(),
        };
        (digest, hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // FIPS 180 "abc" test vectors.
    const ABC_SHA1: &str = "a9993e364706816aba3e25717850c26c9cd0d89d";
    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn compute_matches_known_vectors() {
        let (digest, hashes) = BlobHashes::compute(b"abc");
        assert_eq!(hashes.sha1, ABC_SHA1);
        assert_eq!(hashes.sha256, ABC_SHA256);
        assert_eq!(digest.to_hex(), ABC_SHA256);
    }

    #[test]
    fn hashes_serialize_only_published_checksums() {
        let (_, hashes) = BlobHashes::compute(b"abc");
        let json = serde_json::to_value(&hashes).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["sha1", "sha256"]);
    }

    #[test]
    fn digest_of_agrees_with_compute() {
        let data = vec![7u8; 200_000];
        let (digest, _) = BlobHashes::compute(&data);
        assert_eq!(BlobDigest::of(&data), digest);
    }

    #[test]
    fn hex_round_trip_accepts_uppercase() {
        let parsed = BlobDigest::from_hex(&ABC_SHA256.to_uppercase()).unwrap();
        assert_eq!(parsed.to_hex(), ABC_SHA256);
    }

    #[test]
    fn from_hex_rejects_wrong_length_and_chars() {
        assert!(BlobDigest::from_hex("abcd").is_err());
        assert!(BlobDigest::from_hex(&"g".repeat(64)).is_err());
    }

    #[test]
    fn serializes_as_hex_string() {
        let digest = BlobDigest::of(b"abc");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{ABC_SHA256}\""));
        let back: BlobDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }

    #[test]
    fn display_is_algorithm_tagged() {
        assert_eq!(BlobDigest::of(b"abc").to_string(), format!("sha256:{ABC_SHA256}"));
    }
}

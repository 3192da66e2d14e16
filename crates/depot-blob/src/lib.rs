//! # depot-blob: Content-Addressed Blob Store
//!
//! Stores raw upload bytes keyed by their SHA-256 [`BlobDigest`]. Identical
//! uploads share one physical copy; each catalog file holding the blob owns
//! one reference, and blobs whose count reaches zero are removed by a
//! deferred [`BlobStore::collect_garbage`] pass.
//!
//! ## Backends
//!
//! - **Memory**: for tests and ephemeral deployments.
//! - **Filesystem**: `{root}/{hex[0..2]}/{hex[2..4]}/{hex}`, written through
//!   a temp file and an atomic no-clobber rename.
//!
//! ## Integrity Invariant
//!
//! [`BlobStore::fetch`] re-hashes the bytes it returns and fails with
//! [`BlobError::Integrity`] if they no longer match the digest they are
//! stored under.
//!
//! [`BlobDigest`]: depot_core::BlobDigest

pub mod backend;
pub mod error;
pub mod store;

pub use error::BlobError;
pub use store::{BlobLease, BlobRecord, BlobStore};

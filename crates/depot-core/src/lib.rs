//! # depot-core: Foundational Types for Depot
//!
//! Leaf crate of the workspace. Defines the identifiers and digest types every
//! other `depot-*` crate shares, so that a package id can never be passed
//! where a version id is expected and every blob is named the same way.
//!
//! ## Key Types
//!
//! - [`OwnerName`]: validated namespace owner (user or organization).
//! - [`PackageType`]: the ecosystem a package belongs to.
//! - [`PackageId`], [`VersionId`], [`FileId`]: catalog identifiers.
//! - [`BlobDigest`]: SHA-256 storage key for blob content.
//! - [`BlobHashes`]: all checksums of a blob, computed in one pass.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `depot-*` crates.
//! - No `unsafe` code.
//! - No `.unwrap()` outside tests.

pub mod digest;
pub mod error;
pub mod identity;

pub use digest::{BlobDigest, BlobHashes};
pub use error::ValidationError;
pub use identity::{FileId, OwnerName, PackageId, PackageType, VersionId};

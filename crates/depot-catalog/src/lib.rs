//! # depot-catalog: Package Catalog
//!
//! Holds the Package → Version → File graph for every ecosystem:
//!
//! - a **Package** is unique per owner, ecosystem and lower-cased name;
//! - a **Version** is unique per package and lower-cased version string,
//!   and immutable once created;
//! - a **File** references one blob by digest and is unique per version by
//!   lower-cased name.
//!
//! The catalog also owns download counters and package search. Persistence
//! is optional: see [`db`].

pub mod catalog;
pub mod db;
pub mod error;
pub mod model;
pub mod search;

pub use catalog::Catalog;
pub use error::CatalogError;
pub use model::{
    NewFile, NewUpload, Package, PackageFile, PackageKey, PackageVersion, VersionDescriptor,
};
pub use search::{PackageSummary, Paginator, SearchOptions, SearchPage};

//! # depot-registry: Registry Core
//!
//! Ecosystem-agnostic upload and download orchestration. Protocol adapters
//! implement [`Ecosystem`] for archive parsing and call [`Registry`] for
//! everything that touches storage.

pub mod ecosystem;
pub mod error;
pub mod registry;

pub use ecosystem::{Ecosystem, ExtractError, ExtractedPackage};
pub use error::RegistryError;
pub use registry::{Download, HydrationSummary, Registry};

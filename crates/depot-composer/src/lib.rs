//! # depot-composer: Composer Ecosystem
//!
//! Hosts PHP packages for the Composer v2 client:
//!
//! - [`ComposerEcosystem`] reads `composer.json` out of uploaded zip
//!   archives ([`extract`]) and normalizes versions ([`version`]).
//! - [`views`] renders the repository protocol documents (service index,
//!   search, package list, `p2` metadata) from catalog records.

pub mod ecosystem;
pub mod extract;
pub mod metadata;
pub mod version;
pub mod views;

pub use ecosystem::ComposerEcosystem;
pub use metadata::{Author, Metadata};

//! # API Route Modules
//!
//! - `composer`: the Composer v2 repository protocol (service index, upload,
//!   download, search, package list, `p2` metadata), scoped per owner.
//!
//! Further ecosystems get their own module next to `composer`, each with a
//! `router()` merged in [`crate::app`].

pub mod composer;

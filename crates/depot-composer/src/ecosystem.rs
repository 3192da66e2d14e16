//! The Composer [`Ecosystem`] implementation.

use std::collections::BTreeMap;

use depot_core::PackageType;
use depot_registry::{Ecosystem, ExtractError, ExtractedPackage};

use crate::extract::parse_archive;
use crate::metadata::PROPERTY_TYPE;
use crate::version::normalize_version;

/// Composer package support for the registry core.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComposerEcosystem;

impl Ecosystem for ComposerEcosystem {
    fn package_type(&self) -> PackageType {
        PackageType::Composer
    }

    fn extract(&self, archive: &[u8]) -> Result<ExtractedPackage, ExtractError> {
        let package = parse_archive(archive)?;
        let properties = BTreeMap::from([(
            PROPERTY_TYPE.to_string(),
            package.metadata.package_type.clone(),
        )]);
        let metadata = serde_json::to_value(&package.metadata)
            .map_err(|e| ExtractError::InvalidPackage(format!("unserializable metadata: {e}")))?;
        Ok(ExtractedPackage {
            name: package.name,
            version: package.version,
            metadata,
            properties,
        })
    }

    fn normalize_version(&self, raw: &str) -> Result<String, ExtractError> {
        normalize_version(raw)
    }

    /// `vendor/project` at `1.0.3` is stored as `vendor-project.1.0.3.zip`.
    fn lead_file_name(&self, name: &str, version: &str) -> String {
        format!("{}.{version}.zip", name.replace('/', "-")).to_lowercase()
    }
}

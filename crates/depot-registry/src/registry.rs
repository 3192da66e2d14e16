//! # Registry Core
//!
//! Orchestrates uploads and downloads across the blob store and the
//! catalog for any [`Ecosystem`].
//!
//! ## Upload
//!
//! 1. Extract metadata from the archive (nothing is mutated on failure).
//! 2. Resolve the version: the archive's own version wins over the one
//!    supplied with the request. Missing or malformed → `BadRequest`.
//! 3. Reject an existing `(package, version)` with `Conflict`.
//! 4. Store the archive under a [`BlobLease`](depot_blob::BlobLease).
//! 5. Commit package, version and lead file to the catalog.
//!
//! Steps 4–5 run to completion on a spawned task, so a client that
//! disconnects mid-commit cannot leave the catalog and the blob reference
//! counts disagreeing. If the commit fails the lease releases the blob.

use depot_blob::BlobStore;
use depot_catalog::{
    Catalog, NewFile, NewUpload, PackageFile, Paginator, SearchOptions, SearchPage,
    VersionDescriptor,
};
use depot_core::{OwnerName, PackageType};

use crate::ecosystem::Ecosystem;
use crate::error::RegistryError;

/// A successful content fetch.
#[derive(Debug, Clone)]
pub struct Download {
    pub descriptor: VersionDescriptor,
    pub file: PackageFile,
    pub content: Vec<u8>,
}

/// Outcome of rebuilding state from persistent storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HydrationSummary {
    pub files: usize,
    /// Files whose blob bytes were not found in the blob backend.
    pub missing_blobs: usize,
}

/// The registry core. Cloning is cheap and clones share state.
#[derive(Debug, Clone)]
pub struct Registry {
    blobs: BlobStore,
    catalog: Catalog,
}

impl Registry {
    pub fn new(blobs: BlobStore, catalog: Catalog) -> Self {
        Self { blobs, catalog }
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Publish a package version from an uploaded archive.
    pub async fn upload<E>(
        &self,
        ecosystem: &E,
        owner: OwnerName,
        archive: Vec<u8>,
        requested_version: Option<String>,
    ) -> Result<VersionDescriptor, RegistryError>
    where
        E: Ecosystem + ?Sized,
    {
        let package_type = ecosystem.package_type();
        let result = self
            .upload_inner(ecosystem, package_type, owner, archive, requested_version)
            .await;
        let outcome = match &result {
            Ok(_) => "created",
            Err(RegistryError::BadRequest(_)) => "bad_request",
            Err(RegistryError::InvalidPackage(_)) => "invalid_package",
            Err(RegistryError::Conflict(_)) => "conflict",
            Err(RegistryError::NotFound(_)) | Err(RegistryError::Internal(_)) => "error",
        };
        metrics::counter!(
            "depot_uploads_total",
            "ecosystem" => package_type.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        result
    }

    async fn upload_inner<E>(
        &self,
        ecosystem: &E,
        package_type: PackageType,
        owner: OwnerName,
        archive: Vec<u8>,
        requested_version: Option<String>,
    ) -> Result<VersionDescriptor, RegistryError>
    where
        E: Ecosystem + ?Sized,
    {
        let extracted = ecosystem.extract(&archive)?;

        let raw_version = extracted
            .version
            .clone()
            .or(requested_version)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| RegistryError::BadRequest("package version is required".to_string()))?;
        let version = ecosystem.normalize_version(&raw_version)?;

        if self
            .catalog
            .version_exists(&owner, package_type, &extracted.name, &version)
        {
            return Err(RegistryError::Conflict(format!(
                "{} version {version} already exists",
                extracted.name
            )));
        }

        let blobs = self.blobs.clone();
        let lease = tokio::task::spawn_blocking(move || blobs.store_leased(&archive))
            .await
            .map_err(|e| RegistryError::Internal(format!("blob store task failed: {e}")))??;

        let blob = lease.record();
        let upload = NewUpload {
            owner,
            package_type,
            files: vec![NewFile {
                name: ecosystem.lead_file_name(&extracted.name, &version),
                is_lead: true,
                size: blob.size,
                blob_digest: blob.digest,
                hashes: blob.hashes.clone(),
            }],
            name: extracted.name,
            version,
            metadata: extracted.metadata,
            properties: extracted.properties,
        };

        let catalog = self.catalog.clone();
        tokio::spawn(async move {
            let descriptor = catalog.commit(upload).await?;
            lease.keep();
            Ok::<_, RegistryError>(descriptor)
        })
        .await
        .map_err(|e| RegistryError::Internal(format!("catalog commit task failed: {e}")))?
    }

    /// Fetch a file's bytes and count the download.
    ///
    /// Version and file names match case-insensitively.
    pub async fn download(
        &self,
        owner: &OwnerName,
        package_type: PackageType,
        name: &str,
        version: &str,
        file_name: &str,
    ) -> Result<Download, RegistryError> {
        let mut descriptor = self
            .catalog
            .find_version(owner, package_type, name, version)
            .ok_or_else(|| RegistryError::NotFound(format!("{name} version {version} not found")))?;
        let file = descriptor
            .file(file_name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("file {file_name} not found")))?;

        let blobs = self.blobs.clone();
        let digest = file.blob_digest;
        let content = tokio::task::spawn_blocking(move || blobs.fetch(&digest))
            .await
            .map_err(|e| RegistryError::Internal(format!("blob fetch task failed: {e}")))??;

        descriptor.version.download_count =
            self.catalog.increment_download(descriptor.version.id).await?;

        metrics::counter!("depot_downloads_total", "ecosystem" => package_type.as_str())
            .increment(1);
        tracing::debug!(
            owner = %owner,
            package = %descriptor.package.name,
            version = %descriptor.version.version,
            file = %file.name,
            "package file downloaded"
        );

        Ok(Download {
            descriptor,
            file,
            content,
        })
    }

    /// Every version of one package. `NotFound` if the package has none.
    pub fn package_versions(
        &self,
        owner: &OwnerName,
        package_type: PackageType,
        name: &str,
    ) -> Result<Vec<VersionDescriptor>, RegistryError> {
        let versions = self.catalog.versions_of(owner, package_type, name);
        if versions.is_empty() {
            return Err(RegistryError::NotFound(format!("package {name} not found")));
        }
        Ok(versions)
    }

    pub fn search(
        &self,
        owner: &OwnerName,
        package_type: PackageType,
        options: &SearchOptions,
        paginator: Paginator,
    ) -> SearchPage {
        self.catalog.search(owner, package_type, options, paginator)
    }

    pub fn package_names(&self, owner: &OwnerName, package_type: PackageType) -> Vec<String> {
        self.catalog.package_names(owner, package_type)
    }

    /// Delete unreferenced blobs. Blocking; call from a blocking context.
    pub fn collect_garbage(&self) -> usize {
        self.blobs.collect_garbage()
    }

    /// Load the catalog from the database and re-register blob references.
    pub async fn hydrate(&self) -> Result<HydrationSummary, RegistryError> {
        let files = self.catalog.hydrate().await?;
        let mut summary = HydrationSummary {
            files: files.len(),
            missing_blobs: 0,
        };
        for file in files {
            if let Err(e) = self
                .blobs
                .restore(&file.blob_digest, file.size, file.hashes.clone())
            {
                summary.missing_blobs += 1;
                tracing::warn!(file = %file.name, digest = %file.blob_digest, error = %e, "catalog file has no blob");
            }
        }
        Ok(summary)
    }
}

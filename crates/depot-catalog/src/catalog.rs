//! # Package Catalog
//!
//! In-memory index of packages, versions and files, optionally written
//! through to Postgres.
//!
//! The state lives behind a `parking_lot::RwLock` that is only held for
//! short synchronous sections, never across an `.await`. Creating a version
//! re-checks uniqueness under the write lock, so of two concurrent uploads
//! of the same version exactly one succeeds.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use depot_core::{FileId, OwnerName, PackageId, PackageType, VersionId};
use parking_lot::RwLock;
use sqlx::PgPool;

use crate::db;
use crate::error::CatalogError;
use crate::model::{
    NewUpload, Package, PackageFile, PackageKey, PackageVersion, VersionDescriptor,
};
use crate::search::{PackageSummary, Paginator, SearchOptions, SearchPage};

#[derive(Debug, Default)]
struct CatalogState {
    packages: HashMap<PackageId, Package>,
    package_keys: HashMap<PackageKey, PackageId>,
    versions: HashMap<VersionId, PackageVersion>,
    /// (package, lower version) → version.
    version_keys: HashMap<(PackageId, String), VersionId>,
    /// Versions of each package in creation order.
    package_versions: HashMap<PackageId, Vec<VersionId>>,
    files: HashMap<VersionId, Vec<PackageFile>>,
}

impl CatalogState {
    fn version_exists(&self, key: &PackageKey, lower_version: &str) -> bool {
        self.package_keys.get(key).is_some_and(|pid| {
            self.version_keys
                .contains_key(&(*pid, lower_version.to_string()))
        })
    }

    fn descriptor(&self, version_id: &VersionId) -> Option<VersionDescriptor> {
        let version = self.versions.get(version_id)?;
        let package = self.packages.get(&version.package_id)?;
        Some(VersionDescriptor {
            package: package.clone(),
            version: version.clone(),
            files: self.files.get(version_id).cloned().unwrap_or_default(),
        })
    }

    fn versions_of(&self, package_id: &PackageId) -> impl Iterator<Item = &PackageVersion> {
        self.package_versions
            .get(package_id)
            .into_iter()
            .flatten()
            .filter_map(|vid| self.versions.get(vid))
    }

    fn insert_package(&mut self, package: Package) {
        self.package_keys.insert(package.key(), package.id);
        self.packages.insert(package.id, package);
    }

    /// Insert a version. Returns `false` if `(package, lower version)` is taken.
    fn insert_version(&mut self, version: PackageVersion, files: Vec<PackageFile>) -> bool {
        let key = (version.package_id, version.lower_version.clone());
        if self.version_keys.contains_key(&key) {
            return false;
        }
        self.version_keys.insert(key, version.id);
        self.package_versions
            .entry(version.package_id)
            .or_default()
            .push(version.id);
        self.files.insert(version.id, files);
        self.versions.insert(version.id, version);
        true
    }
}

/// Thread-safe, cloneable package catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    state: Arc<RwLock<CatalogState>>,
    pool: Option<PgPool>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl Catalog {
    /// A catalog with no persistence.
    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(RwLock::new(CatalogState::default())),
            pool: None,
        }
    }

    /// A catalog that writes through to Postgres.
    ///
    /// Call [`Self::hydrate`] before serving to load existing rows.
    pub fn with_pool(pool: PgPool) -> Self {
        Self {
            state: Arc::new(RwLock::new(CatalogState::default())),
            pool: Some(pool),
        }
    }

    pub fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }

    /// Whether `(owner, type, name, version)` is already taken.
    pub fn version_exists(
        &self,
        owner: &OwnerName,
        package_type: PackageType,
        name: &str,
        version: &str,
    ) -> bool {
        let key = PackageKey::new(owner, package_type, name);
        self.state
            .read()
            .version_exists(&key, &version.to_lowercase())
    }

    /// Create a version, its files, and the package if it is new.
    ///
    /// With a database the rows are committed in one transaction first; the
    /// in-memory state is only updated once that succeeds.
    pub async fn commit(&self, upload: NewUpload) -> Result<VersionDescriptor, CatalogError> {
        let key = PackageKey::new(&upload.owner, upload.package_type, &upload.name);
        let lower_version = upload.version.to_lowercase();
        let now = Utc::now();

        let existing = {
            let state = self.state.read();
            if state.version_exists(&key, &lower_version) {
                return Err(CatalogError::conflict(&upload.name, &upload.version));
            }
            state
                .package_keys
                .get(&key)
                .and_then(|id| state.packages.get(id))
                .cloned()
        };

        let mut package = existing.unwrap_or_else(|| Package {
            id: PackageId::new(),
            owner: upload.owner.clone(),
            package_type: upload.package_type,
            name: upload.name.clone(),
            lower_name: key.lower_name.clone(),
            created_at: now,
        });

        let version_id = VersionId::new();
        let mut version = PackageVersion {
            id: version_id,
            package_id: package.id,
            version: upload.version.clone(),
            lower_version,
            metadata: upload.metadata,
            properties: upload.properties,
            download_count: 0,
            created_at: now,
        };
        let files: Vec<PackageFile> = upload
            .files
            .into_iter()
            .map(|f| PackageFile {
                id: FileId::new(),
                version_id,
                lower_name: f.name.to_lowercase(),
                name: f.name,
                size: f.size,
                is_lead: f.is_lead,
                blob_digest: f.blob_digest,
                hashes: f.hashes,
                created_at: now,
            })
            .collect();

        if let Some(pool) = &self.pool {
            let persisted_id = db::packages::insert_upload(pool, &package, &version, &files).await?;
            package.id = persisted_id;
            version.package_id = persisted_id;
        }

        let mut state = self.state.write();
        // Another upload may have created the package since the read above.
        if let Some(id) = state.package_keys.get(&key).copied() {
            if let Some(current) = state.packages.get(&id) {
                package = current.clone();
            }
            version.package_id = id;
        } else {
            state.insert_package(package.clone());
        }
        if !state.insert_version(version.clone(), files.clone()) {
            return Err(CatalogError::conflict(&upload.name, &upload.version));
        }
        drop(state);

        tracing::info!(
            owner = %package.owner,
            package = %package.name,
            version = %version.version,
            "package version created"
        );

        Ok(VersionDescriptor {
            package,
            version,
            files,
        })
    }

    /// Add one to a version's download counter. Returns the new count.
    pub async fn increment_download(&self, version_id: VersionId) -> Result<u64, CatalogError> {
        if let Some(pool) = &self.pool {
            if !db::packages::increment_download(pool, version_id).await? {
                return Err(CatalogError::NotFound(version_id.to_string()));
            }
        }
        let mut state = self.state.write();
        let version = state
            .versions
            .get_mut(&version_id)
            .ok_or_else(|| CatalogError::NotFound(version_id.to_string()))?;
        version.download_count += 1;
        Ok(version.download_count)
    }

    pub fn find_package(
        &self,
        owner: &OwnerName,
        package_type: PackageType,
        name: &str,
    ) -> Option<Package> {
        let state = self.state.read();
        let id = state
            .package_keys
            .get(&PackageKey::new(owner, package_type, name))?;
        state.packages.get(id).cloned()
    }

    /// Resolve one version, case-insensitively on name and version.
    pub fn find_version(
        &self,
        owner: &OwnerName,
        package_type: PackageType,
        name: &str,
        version: &str,
    ) -> Option<VersionDescriptor> {
        let state = self.state.read();
        let package_id = *state
            .package_keys
            .get(&PackageKey::new(owner, package_type, name))?;
        let version_id = state
            .version_keys
            .get(&(package_id, version.to_lowercase()))?;
        state.descriptor(version_id)
    }

    /// All versions of a package in creation order. Empty for unknown packages.
    pub fn versions_of(
        &self,
        owner: &OwnerName,
        package_type: PackageType,
        name: &str,
    ) -> Vec<VersionDescriptor> {
        let state = self.state.read();
        let Some(package_id) = state
            .package_keys
            .get(&PackageKey::new(owner, package_type, name))
        else {
            return Vec::new();
        };
        state
            .package_versions
            .get(package_id)
            .into_iter()
            .flatten()
            .filter_map(|vid| state.descriptor(vid))
            .collect()
    }

    /// Every version of every package of one type in an owner's namespace.
    pub fn versions_by_type(
        &self,
        owner: &OwnerName,
        package_type: PackageType,
    ) -> Vec<VersionDescriptor> {
        let state = self.state.read();
        let owner = owner.lower();
        let mut descriptors: Vec<VersionDescriptor> = state
            .packages
            .values()
            .filter(|p| p.package_type == package_type && p.owner.lower() == owner)
            .flat_map(|p| state.package_versions.get(&p.id).into_iter().flatten())
            .filter_map(|vid| state.descriptor(vid))
            .collect();
        descriptors.sort_by(|a, b| {
            a.package
                .lower_name
                .cmp(&b.package.lower_name)
                .then(a.version.created_at.cmp(&b.version.created_at))
        });
        descriptors
    }

    /// Names of every package of one type in an owner's namespace, sorted.
    pub fn package_names(&self, owner: &OwnerName, package_type: PackageType) -> Vec<String> {
        let state = self.state.read();
        let owner = owner.lower();
        let mut packages: Vec<&Package> = state
            .packages
            .values()
            .filter(|p| p.package_type == package_type && p.owner.lower() == owner)
            .filter(|p| state.package_versions.get(&p.id).is_some_and(|v| !v.is_empty()))
            .collect();
        packages.sort_by(|a, b| a.lower_name.cmp(&b.lower_name));
        packages.into_iter().map(|p| p.name.clone()).collect()
    }

    /// Search packages in an owner's namespace.
    ///
    /// Matches are sorted by lower-cased name; `total` counts every match,
    /// `packages` holds only the requested page.
    pub fn search(
        &self,
        owner: &OwnerName,
        package_type: PackageType,
        options: &SearchOptions,
        paginator: Paginator,
    ) -> SearchPage {
        let state = self.state.read();
        let owner = owner.lower();
        let query = options.query.to_lowercase();

        let mut matches: Vec<PackageSummary> = state
            .packages
            .values()
            .filter(|p| p.package_type == package_type && p.owner.lower() == owner)
            .filter(|p| p.lower_name.contains(&query))
            .filter_map(|p| {
                let versions: Vec<&PackageVersion> = state.versions_of(&p.id).collect();
                let latest = versions.iter().max_by_key(|v| v.created_at)?;
                if let Some((key, value)) = &options.property {
                    let has_property = versions
                        .iter()
                        .any(|v| v.properties.get(key) == Some(value));
                    if !has_property {
                        return None;
                    }
                }
                Some(PackageSummary {
                    package: p.clone(),
                    latest: (*latest).clone(),
                    downloads: versions.iter().map(|v| v.download_count).sum(),
                })
            })
            .collect();

        matches.sort_by(|a, b| a.package.lower_name.cmp(&b.package.lower_name));
        let total = matches.len();
        let packages = matches
            .into_iter()
            .skip(paginator.offset())
            .take(paginator.per_page())
            .collect();

        SearchPage {
            total,
            packages,
            paginator,
        }
    }

    /// Rebuild the in-memory state from the database.
    ///
    /// Returns every loaded file so the caller can re-register blob
    /// references. A catalog without a pool hydrates to nothing.
    pub async fn hydrate(&self) -> Result<Vec<PackageFile>, CatalogError> {
        let Some(pool) = &self.pool else {
            return Ok(Vec::new());
        };
        let rows = db::packages::load_all(pool).await?;

        let mut files_by_version: BTreeMap<VersionId, Vec<PackageFile>> = BTreeMap::new();
        for file in &rows.files {
            files_by_version
                .entry(file.version_id)
                .or_default()
                .push(file.clone());
        }

        let mut fresh = CatalogState::default();
        let package_count = rows.packages.len();
        for package in rows.packages {
            fresh.insert_package(package);
        }
        let mut version_count = 0usize;
        for version in rows.versions {
            if !fresh.packages.contains_key(&version.package_id) {
                tracing::warn!(version = %version.id, "skipping version of unknown package");
                continue;
            }
            let files = files_by_version.remove(&version.id).unwrap_or_default();
            if fresh.insert_version(version, files) {
                version_count += 1;
            }
        }

        let files: Vec<PackageFile> = fresh.files.values().flatten().cloned().collect();
        *self.state.write() = fresh;

        tracing::info!(
            packages = package_count,
            versions = version_count,
            files = files.len(),
            "catalog hydrated from database"
        );
        Ok(files)
    }
}

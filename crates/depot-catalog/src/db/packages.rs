//! Package catalog persistence operations.
//!
//! All functions take a `&PgPool` and operate on the `packages`,
//! `package_versions` and `package_files` tables.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use depot_core::{BlobDigest, BlobHashes, FileId, OwnerName, PackageId, PackageType, VersionId};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::CatalogError;
use crate::model::{Package, PackageFile, PackageVersion};

/// Insert a version and its files, creating the package row if needed.
///
/// Runs in one transaction. Returns the id of the package row the version
/// was attached to, which differs from `package.id` when the row already
/// existed. A duplicate version maps to [`CatalogError::Conflict`].
pub async fn insert_upload(
    pool: &PgPool,
    package: &Package,
    version: &PackageVersion,
    files: &[PackageFile],
) -> Result<PackageId, CatalogError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO packages (id, owner, lower_owner, package_type, name, lower_name, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (lower_owner, package_type, lower_name) DO NOTHING",
    )
    .bind(package.id.0)
    .bind(package.owner.as_str())
    .bind(package.owner.lower())
    .bind(package.package_type.as_str())
    .bind(&package.name)
    .bind(&package.lower_name)
    .bind(package.created_at)
    .execute(&mut *tx)
    .await?;

    let package_id: Uuid = sqlx::query_scalar(
        "SELECT id FROM packages WHERE lower_owner = $1 AND package_type = $2 AND lower_name = $3",
    )
    .bind(package.owner.lower())
    .bind(package.package_type.as_str())
    .bind(&package.lower_name)
    .fetch_one(&mut *tx)
    .await?;

    let inserted = sqlx::query(
        "INSERT INTO package_versions (id, package_id, version, lower_version, metadata,
         properties, download_count, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, 0, $7)",
    )
    .bind(version.id.0)
    .bind(package_id)
    .bind(&version.version)
    .bind(&version.lower_version)
    .bind(&version.metadata)
    .bind(Json(&version.properties))
    .bind(version.created_at)
    .execute(&mut *tx)
    .await;

    match inserted {
        Ok(_) => {}
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(CatalogError::conflict(&package.name, &version.version));
        }
        Err(e) => return Err(e.into()),
    }

    for file in files {
        sqlx::query(
            "INSERT INTO package_files (id, version_id, name, lower_name, size, is_lead,
             blob_sha256, hash_sha1, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(file.id.0)
        .bind(version.id.0)
        .bind(&file.name)
        .bind(&file.lower_name)
        .bind(file.size as i64)
        .bind(file.is_lead)
        .bind(file.blob_digest.to_hex())
        .bind(&file.hashes.sha1)
        .bind(file.created_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(PackageId(package_id))
}

/// Atomically add one to a version's download counter.
pub async fn increment_download(pool: &PgPool, version_id: VersionId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE package_versions SET download_count = download_count + 1 WHERE id = $1",
    )
    .bind(version_id.0)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Every catalog row, loaded on startup to rebuild in-memory state.
#[derive(Debug, Default)]
pub struct CatalogRows {
    pub packages: Vec<Package>,
    pub versions: Vec<PackageVersion>,
    pub files: Vec<PackageFile>,
}

/// Load the full catalog.
pub async fn load_all(pool: &PgPool) -> Result<CatalogRows, CatalogError> {
    let packages = sqlx::query_as::<_, PackageRow>(
        "SELECT id, owner, package_type, name, lower_name, created_at
         FROM packages ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    let versions = sqlx::query_as::<_, VersionRow>(
        "SELECT id, package_id, version, lower_version, metadata, properties,
         download_count, created_at
         FROM package_versions ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    let files = sqlx::query_as::<_, FileRow>(
        "SELECT id, version_id, name, lower_name, size, is_lead, blob_sha256,
         hash_sha1, created_at
         FROM package_files ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(CatalogRows {
        packages: packages
            .into_iter()
            .map(PackageRow::into_record)
            .collect::<Result<_, _>>()?,
        versions: versions.into_iter().map(VersionRow::into_record).collect(),
        files: files
            .into_iter()
            .map(FileRow::into_record)
            .collect::<Result<_, _>>()?,
    })
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct PackageRow {
    id: Uuid,
    owner: String,
    package_type: String,
    name: String,
    lower_name: String,
    created_at: DateTime<Utc>,
}

impl PackageRow {
    fn into_record(self) -> Result<Package, CatalogError> {
        let owner = OwnerName::new(self.owner)
            .map_err(|e| CatalogError::Corrupt(format!("package {}: {e}", self.id)))?;
        let package_type: PackageType = self
            .package_type
            .parse()
            .map_err(|e| CatalogError::Corrupt(format!("package {}: {e}", self.id)))?;
        Ok(Package {
            id: PackageId(self.id),
            owner,
            package_type,
            name: self.name,
            lower_name: self.lower_name,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VersionRow {
    id: Uuid,
    package_id: Uuid,
    version: String,
    lower_version: String,
    metadata: serde_json::Value,
    properties: Json<BTreeMap<String, String>>,
    download_count: i64,
    created_at: DateTime<Utc>,
}

impl VersionRow {
    fn into_record(self) -> PackageVersion {
        PackageVersion {
            id: VersionId(self.id),
            package_id: PackageId(self.package_id),
            version: self.version,
            lower_version: self.lower_version,
            metadata: self.metadata,
            properties: self.properties.0,
            download_count: self.download_count.max(0) as u64,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FileRow {
    id: Uuid,
    version_id: Uuid,
    name: String,
    lower_name: String,
    size: i64,
    is_lead: bool,
    blob_sha256: String,
    hash_sha1: String,
    created_at: DateTime<Utc>,
}

impl FileRow {
    fn into_record(self) -> Result<PackageFile, CatalogError> {
        let blob_digest = BlobDigest::from_hex(&self.blob_sha256)
            .map_err(|e| CatalogError::Corrupt(format!("file {}: {e}", self.id)))?;
        Ok(PackageFile {
            id: FileId(self.id),
            version_id: VersionId(self.version_id),
            name: self.name,
            lower_name: self.lower_name,
            size: self.size.max(0) as u64,
            is_lead: self.is_lead,
            blob_digest,
            hashes: BlobHashes {
                sha1: self.hash_sha1,
                sha256: self.blob_sha256,
            },
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_row_with_unknown_type_is_corrupt() {
        let row = PackageRow {
            id: Uuid::new_v4(),
            owner: "user2".to_string(),
            package_type: "npm".to_string(),
            name: "left-pad".to_string(),
            lower_name: "left-pad".to_string(),
            created_at: Utc::now(),
        };
        assert!(matches!(row.into_record(), Err(CatalogError::Corrupt(_))));
    }

    #[test]
    fn file_row_maps_digest_and_hashes() {
        let (digest, hashes) = BlobHashes::compute(b"archive");
        let row = FileRow {
            id: Uuid::new_v4(),
            version_id: Uuid::new_v4(),
            name: "a.zip".to_string(),
            lower_name: "a.zip".to_string(),
            size: 7,
            is_lead: true,
            blob_sha256: hashes.sha256.clone(),
            hash_sha1: hashes.sha1.clone(),
            created_at: Utc::now(),
        };
        let file = row.into_record().unwrap();
        assert_eq!(file.blob_digest, digest);
        assert_eq!(file.hashes, hashes);
        assert_eq!(file.size, 7);
    }

    #[test]
    fn file_row_with_bad_digest_is_corrupt() {
        let row = FileRow {
            id: Uuid::new_v4(),
            version_id: Uuid::new_v4(),
            name: "a.zip".to_string(),
            lower_name: "a.zip".to_string(),
            size: 1,
            is_lead: true,
            blob_sha256: "not-hex".to_string(),
            hash_sha1: String::new(),
            created_at: Utc::now(),
        };
        assert!(matches!(row.into_record(), Err(CatalogError::Corrupt(_))));
    }
}

//! # Composer Repository API
//!
//! Serves one Composer v2 repository per owner under
//! `/api/packages/{owner}/composer`. Response bodies are rendered by
//! [`depot_composer::views`]; this module only does HTTP plumbing and
//! authorization.

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use depot_catalog::{Paginator, SearchOptions};
use depot_composer::metadata::PROPERTY_TYPE;
use depot_composer::views::{
    self, ComposerUrls, PackageListResponse, PackageMetadataResponse, SearchResultResponse,
    ServiceIndexResponse,
};
use depot_core::{OwnerName, PackageType};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{require_publisher, CallerIdentity};
use crate::error::AppError;
use crate::state::AppState;

const BASE: &str = "/api/packages/{owner}/composer";

/// Query string of an upload.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadQuery {
    /// Version to publish when `composer.json` declares none.
    pub version: Option<String>,
}

/// Returned after a successful upload.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    /// Identifier of the created version.
    pub id: Uuid,
    pub name: String,
    pub version: String,
    /// Stored file name of the archive.
    pub file: String,
}

/// Search parameters. Numbers arrive as strings so unparseable values fall
/// back to defaults instead of rejecting the request.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Case-insensitive substring of the package name.
    pub q: Option<String>,
    /// Composer package type, e.g. `library`.
    #[serde(rename = "type")]
    pub package_type: Option<String>,
    /// 1-indexed page number.
    pub page: Option<String>,
    /// Page size; 0 or garbage selects the default of 10, maximum 100.
    pub per_page: Option<String>,
}

/// Build the Composer router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(&format!("{BASE}/packages.json"), get(get_service_index))
        .route(BASE, put(upload_package))
        .route(&format!("{BASE}/files/{{*path}}"), get(download_package_file))
        .route(&format!("{BASE}/search.json"), get(search_packages))
        .route(&format!("{BASE}/list.json"), get(list_packages))
        .route(&format!("{BASE}/p2/{{vendor}}/{{file}}"), get(get_package_metadata))
}

/// An owner that cannot exist has no repository.
fn owner_from_path(raw: &str) -> Result<OwnerName, AppError> {
    OwnerName::new(raw).map_err(|_| AppError::NotFound(format!("owner {raw} not found")))
}

fn urls(state: &AppState, owner: &OwnerName) -> ComposerUrls {
    ComposerUrls::new(&state.config.app_url, owner)
}

/// GET /api/packages/{owner}/composer/packages.json: Service index.
#[utoipa::path(
    get,
    path = "/api/packages/{owner}/composer/packages.json",
    params(("owner" = String, Path, description = "Package owner")),
    responses(
        (status = 200, description = "Service index", body = ServiceIndexResponse),
        (status = 404, description = "Unknown owner", body = crate::error::ErrorBody),
    ),
    tag = "composer"
)]
async fn get_service_index(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<Json<ServiceIndexResponse>, AppError> {
    let owner = owner_from_path(&owner)?;
    Ok(Json(views::service_index(&urls(&state, &owner))))
}

/// PUT /api/packages/{owner}/composer: Publish a package archive.
#[utoipa::path(
    put,
    path = "/api/packages/{owner}/composer",
    params(("owner" = String, Path, description = "Package owner"), UploadQuery),
    request_body(content = Vec<u8>, content_type = "application/zip", description = "Package zip archive"),
    responses(
        (status = 201, description = "Version created", body = UploadResponse),
        (status = 400, description = "Invalid archive or version", body = crate::error::ErrorBody),
        (status = 401, description = "Authentication required", body = crate::error::ErrorBody),
        (status = 403, description = "Not allowed for this owner", body = crate::error::ErrorBody),
        (status = 409, description = "Version already exists", body = crate::error::ErrorBody),
        (status = 413, description = "Archive too large", body = crate::error::ErrorBody),
    ),
    tag = "composer"
)]
async fn upload_package(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(owner): Path<String>,
    Query(query): Query<UploadQuery>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let owner = owner_from_path(&owner)?;
    require_publisher(&caller, &owner)?;

    let archive = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(format!(
                "archive exceeds the {} byte upload limit",
                state.config.max_upload_bytes
            ))
        } else {
            AppError::BadRequest(rejection.body_text())
        }
    })?;

    let descriptor = state
        .registry
        .upload(&state.composer, owner, archive.to_vec(), query.version)
        .await?;
    let file = descriptor
        .lead_file()
        .map(|f| f.name.clone())
        .unwrap_or_default();

    tracing::info!(
        owner = %descriptor.package.owner,
        package = %descriptor.package.name,
        version = %descriptor.version.version,
        "composer package published"
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            id: *descriptor.version.id.as_uuid(),
            name: descriptor.package.name,
            version: descriptor.version.version,
            file,
        }),
    ))
}

/// GET /api/packages/{owner}/composer/files/{package}/{version}/{filename}: Download.
///
/// `package` is normally the escaped `vendor%2Fproject` form used in
/// `dist.url`; the unescaped `vendor/project` form is accepted too.
#[utoipa::path(
    get,
    path = "/api/packages/{owner}/composer/files/{package}/{version}/{filename}",
    params(
        ("owner" = String, Path, description = "Package owner"),
        ("package" = String, Path, description = "Package name, `/` escaped as %2F"),
        ("version" = String, Path, description = "Package version"),
        ("filename" = String, Path, description = "Stored file name"),
    ),
    responses(
        (status = 200, description = "Archive bytes", body = Vec<u8>, content_type = "application/zip"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "composer"
)]
async fn download_package_file(
    State(state): State<AppState>,
    Path((owner, path)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (package, version, filename) = split_file_path(&path)
        .ok_or_else(|| AppError::NotFound(format!("file {path} not found")))?;
    serve_file(&state, &owner, package, version, filename).await
}

/// Split a decoded `vendor/project/version/filename` path.
fn split_file_path(path: &str) -> Option<(&str, &str, &str)> {
    let mut parts = path.trim_start_matches('/').rsplitn(3, '/');
    let filename = parts.next()?;
    let version = parts.next()?;
    let package = parts.next()?;
    let well_formed = !filename.is_empty()
        && !version.is_empty()
        && package.split('/').count() == 2
        && package.split('/').all(|p| !p.is_empty());
    well_formed.then_some((package, version, filename))
}

async fn serve_file(
    state: &AppState,
    owner: &str,
    package: &str,
    version: &str,
    filename: &str,
) -> Result<Response, AppError> {
    let owner = owner_from_path(owner)?;
    let download = state
        .registry
        .download(&owner, PackageType::Composer, package, version, filename)
        .await?;

    let content_type = if download.file.lower_name.ends_with(".zip") {
        "application/zip"
    } else {
        "application/octet-stream"
    };
    let disposition = format!(
        "attachment; filename=\"{}\"",
        download.file.name.replace('"', "")
    );

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.content,
    )
        .into_response())
}

fn parse_number(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// GET /api/packages/{owner}/composer/search.json: Search packages.
#[utoipa::path(
    get,
    path = "/api/packages/{owner}/composer/search.json",
    params(("owner" = String, Path, description = "Package owner"), SearchQuery),
    responses(
        (status = 200, description = "Matching packages", body = SearchResultResponse),
        (status = 404, description = "Unknown owner", body = crate::error::ErrorBody),
    ),
    tag = "composer"
)]
async fn search_packages(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResultResponse>, AppError> {
    let owner = owner_from_path(&owner)?;
    let text = query.q.unwrap_or_default();
    let package_type = query.package_type.unwrap_or_default();

    let options = SearchOptions {
        query: text.clone(),
        property: (!package_type.is_empty())
            .then(|| (PROPERTY_TYPE.to_string(), package_type.clone())),
    };
    let paginator = Paginator::new(
        parse_number(query.page.as_deref(), 1),
        parse_number(query.per_page.as_deref(), 0),
    );

    let page = state
        .registry
        .search(&owner, PackageType::Composer, &options, paginator);
    Ok(Json(views::search_results(
        &urls(&state, &owner),
        &page,
        &text,
        &package_type,
    )))
}

/// GET /api/packages/{owner}/composer/list.json: All package names.
#[utoipa::path(
    get,
    path = "/api/packages/{owner}/composer/list.json",
    params(("owner" = String, Path, description = "Package owner")),
    responses(
        (status = 200, description = "Package names", body = PackageListResponse),
        (status = 404, description = "Unknown owner", body = crate::error::ErrorBody),
    ),
    tag = "composer"
)]
async fn list_packages(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<Json<PackageListResponse>, AppError> {
    let owner = owner_from_path(&owner)?;
    Ok(Json(PackageListResponse {
        package_names: state.registry.package_names(&owner, PackageType::Composer),
    }))
}

/// GET /api/packages/{owner}/composer/p2/{vendor}/{project}.json: Package metadata.
///
/// `{project}~dev.json` returns the same document.
#[utoipa::path(
    get,
    path = "/api/packages/{owner}/composer/p2/{vendor}/{file}",
    params(
        ("owner" = String, Path, description = "Package owner"),
        ("vendor" = String, Path, description = "Vendor part of the package name"),
        ("file" = String, Path, description = "`{project}.json` or `{project}~dev.json`"),
    ),
    responses(
        (status = 200, description = "Package metadata", body = PackageMetadataResponse),
        (status = 404, description = "Unknown package", body = crate::error::ErrorBody),
    ),
    tag = "composer"
)]
async fn get_package_metadata(
    State(state): State<AppState>,
    Path((owner, vendor, file)): Path<(String, String, String)>,
) -> Result<Json<PackageMetadataResponse>, AppError> {
    let owner = owner_from_path(&owner)?;
    let project = views::project_from_file_name(&file)
        .ok_or_else(|| AppError::NotFound(format!("no metadata document {file}")))?;
    let name = format!("{vendor}/{project}");

    let versions = state
        .registry
        .package_versions(&owner, PackageType::Composer, &name)?;
    Ok(Json(views::package_metadata(&urls(&state, &owner), &name, &versions)))
}

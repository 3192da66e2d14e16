//! # OpenAPI Specification Assembly
//!
//! Assembles the utoipa-documented routes into one OpenAPI document,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI document for the registry API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Depot Package Registry",
        version = "0.1.0",
        description = "Owner-scoped package repositories. Composer v2 protocol: service index, upload, download, search, package list, and per-package metadata."
    ),
    paths(
        crate::routes::composer::get_service_index,
        crate::routes::composer::upload_package,
        crate::routes::composer::download_package_file,
        crate::routes::composer::search_packages,
        crate::routes::composer::list_packages,
        crate::routes::composer::get_package_metadata,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::composer::UploadResponse,
        depot_composer::views::ServiceIndexResponse,
        depot_composer::views::SearchResultResponse,
        depot_composer::views::SearchResult,
        depot_composer::views::PackageListResponse,
        depot_composer::views::PackageMetadataResponse,
        depot_composer::views::PackageVersionMetadata,
        depot_composer::views::Dist,
        depot_composer::Metadata,
        depot_composer::Author,
    )),
    tags(
        (name = "composer", description = "Composer v2 repository protocol"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

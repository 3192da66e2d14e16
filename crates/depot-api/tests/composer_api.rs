//! # Integration Tests for the Composer repository API
//!
//! Drives the full router with `tower::ServiceExt::oneshot`: publishing,
//! downloading, search, enumeration, `p2` metadata, authentication and
//! operational routes.

use std::io::{Cursor, Write};

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use depot_api::state::{AppConfig, AppState};
use depot_blob::BlobStore;
use depot_catalog::Catalog;
use depot_registry::Registry;
use http_body_util::BodyExt;
use serde_json::Value;
use sha1::{Digest, Sha1};
use tower::ServiceExt;
use zip::write::SimpleFileOptions;

const BASE: &str = "/api/packages/user2/composer";
const APP_URL: &str = "http://localhost:8080";
const PACKAGE_NAME: &str = "gitea/composer-package";
const PACKAGE_TYPE: &str = "composer-plugin";

fn descriptor_json(version: Option<&str>) -> String {
    let version = version
        .map(|v| format!(r#""version": "{v}","#))
        .unwrap_or_default();
    format!(
        r#"{{
            "name": "{PACKAGE_NAME}",
            {version}
            "description": "Package Description",
            "type": "{PACKAGE_TYPE}",
            "license": "MIT",
            "authors": [{{ "name": "Gitea Authors", "email": "no.reply@gitea.io" }}]
        }}"#
    )
}

fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn package_zip() -> Vec<u8> {
    zip_with(&[("composer.json", &descriptor_json(None))])
}

fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

/// Helper: build the test app with auth disabled and in-memory storage.
fn test_app() -> Router {
    depot_api::app(AppState::new())
}

/// Helper: build the test app with auth enabled.
fn test_app_with_auth(token: &str) -> Router {
    let config = AppConfig {
        auth_token: Some(token.to_string()),
        ..AppConfig::default()
    };
    depot_api::app(AppState::with_config(config))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Bytes) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let (status, _, body) = send(app, request).await;
    (status, body)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn upload_request(uri: &str, archive: Vec<u8>, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("PUT").uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::from(archive)).unwrap()
}

async fn upload(app: &Router, uri: &str, archive: Vec<u8>) -> (StatusCode, Value) {
    let (status, _, body) = send(app, upload_request(uri, archive, None)).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn local_path(url: &str) -> &str {
    url.strip_prefix(APP_URL).unwrap()
}

// -- Service index ------------------------------------------------------------

#[tokio::test]
async fn service_index_points_at_owner_routes() {
    let app = test_app();
    let (status, body) = get_json(&app, &format!("{BASE}/packages.json")).await;
    assert_eq!(status, StatusCode::OK);
    let base = format!("{APP_URL}{BASE}");
    assert_eq!(body["search"], format!("{base}/search.json?q=%query%&type=%type%"));
    assert_eq!(body["metadata-url"], format!("{base}/p2/%package%.json"));
    assert_eq!(body["list"], format!("{base}/list.json"));
}

// -- Upload -------------------------------------------------------------------

#[tokio::test]
async fn upload_without_version_is_rejected() {
    let app = test_app();
    let (status, body) = upload(&app, BASE, package_zip()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn upload_of_garbage_is_invalid_package() {
    let app = test_app();
    let (status, body) = upload(&app, &format!("{BASE}?version=1.0.0"), b"not a zip".to_vec()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_PACKAGE");

    let no_descriptor = zip_with(&[("README.md", "# hi")]);
    let (status, body) = upload(&app, &format!("{BASE}?version=1.0.0"), no_descriptor).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_PACKAGE");
}

#[tokio::test]
async fn upload_then_duplicate_conflicts() {
    let app = test_app();
    let uri = format!("{BASE}?version=1.0.3");

    let (status, body) = upload(&app, &uri, package_zip()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], PACKAGE_NAME);
    assert_eq!(body["version"], "1.0.3");
    assert_eq!(body["file"], "gitea-composer-package.1.0.3.zip");
    assert!(body["id"].as_str().is_some());

    // Same version again, different bytes: still a conflict.
    let other = zip_with(&[
        ("composer.json", &descriptor_json(None)),
        ("src/Extra.php", "<?php"),
    ]);
    let (status, body) = upload(&app, &uri, other).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn descriptor_version_wins_over_query() {
    let app = test_app();
    let archive = zip_with(&[("composer.json", &descriptor_json(Some("v2.1")))]);
    let (status, body) = upload(&app, &format!("{BASE}?version=9.9.9"), archive).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["version"], "2.1.0");
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let config = AppConfig {
        max_upload_bytes: 64,
        ..AppConfig::default()
    };
    let app = depot_api::app(AppState::with_config(config));
    let (status, body) = upload(&app, &format!("{BASE}?version=1.0.0"), package_zip()).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_uploads_of_one_version_have_one_winner() {
    let app = test_app();
    let uri = format!("{BASE}?version=1.0.0");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let app = app.clone();
        let uri = uri.clone();
        handles.push(tokio::spawn(async move {
            send(&app, upload_request(&uri, package_zip(), None)).await.0
        }));
    }
    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => conflicts += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 7);
}

// -- Download -----------------------------------------------------------------

#[tokio::test]
async fn download_returns_uploaded_bytes_and_counts() {
    let app = test_app();
    let archive = package_zip();
    let (status, _) = upload(&app, &format!("{BASE}?version=1.0.3"), archive.clone()).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, metadata) = get_json(&app, &format!("{BASE}/p2/{PACKAGE_NAME}.json")).await;
    let url = metadata["packages"][PACKAGE_NAME][0]["dist"]["url"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(url.ends_with("/files/gitea%2Fcomposer-package/1.0.3/gitea-composer-package.1.0.3.zip"));

    for _ in 0..3 {
        let request = Request::builder()
            .uri(local_path(&url))
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/zip");
        assert!(headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("gitea-composer-package.1.0.3.zip"));
        assert_eq!(&body[..], &archive[..]);
    }

    let (_, search) = get_json(&app, &format!("{BASE}/search.json?q=gitea")).await;
    assert_eq!(search["results"][0]["downloads"], 3);
}

#[tokio::test]
async fn unescaped_download_route_serves_the_same_file() {
    let app = test_app();
    let archive = package_zip();
    upload(&app, &format!("{BASE}?version=1.0.3"), archive.clone()).await;

    let (status, body) = get(
        &app,
        &format!("{BASE}/files/gitea/composer-package/1.0.3/gitea-composer-package.1.0.3.zip"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], &archive[..]);
}

#[tokio::test]
async fn download_lookups_are_case_insensitive() {
    let app = test_app();
    upload(&app, &format!("{BASE}?version=1.0.3"), package_zip()).await;
    let (status, _) = get(
        &app,
        &format!("{BASE}/files/Gitea%2FComposer-Package/1.0.3/GITEA-composer-package.1.0.3.zip"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn download_of_unknown_file_is_404() {
    let app = test_app();
    upload(&app, &format!("{BASE}?version=1.0.3"), package_zip()).await;

    for uri in [
        format!("{BASE}/files/gitea%2Fcomposer-package/9.9.9/gitea-composer-package.9.9.9.zip"),
        format!("{BASE}/files/gitea%2Fcomposer-package/1.0.3/other.zip"),
        format!("{BASE}/files/nobody%2Fnothing/1.0.0/x.zip"),
        format!("{BASE}/files/no-vendor/1.0.0/x.zip"),
    ] {
        let (status, body) = get_json(&app, &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }
}

#[tokio::test]
async fn filesystem_blob_store_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::new(BlobStore::filesystem(dir.path()), Catalog::in_memory());
    let app = depot_api::app(AppState::with_registry(AppConfig::default(), registry));
    let archive = package_zip();

    let (status, _) = upload(&app, &format!("{BASE}?version=1.0.3"), archive.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = get(
        &app,
        &format!("{BASE}/files/gitea%2Fcomposer-package/1.0.3/gitea-composer-package.1.0.3.zip"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], &archive[..]);
}

// -- Search and list ----------------------------------------------------------

#[tokio::test]
async fn search_filters_and_paginates() {
    let app = test_app();
    upload(&app, &format!("{BASE}?version=1.0.3"), package_zip()).await;

    struct Case {
        query: &'static str,
        package_type: &'static str,
        page: i32,
        per_page: i32,
        total: u64,
        results: usize,
    }
    let cases = [
        Case { query: "", package_type: "", page: 0, per_page: 0, total: 1, results: 1 },
        Case { query: "", package_type: "", page: 1, per_page: 1, total: 1, results: 1 },
        Case { query: "test", package_type: "", page: 1, per_page: 0, total: 0, results: 0 },
        Case { query: "gitea", package_type: "", page: 1, per_page: 1, total: 1, results: 1 },
        Case { query: "gitea", package_type: "", page: 2, per_page: 1, total: 1, results: 0 },
        Case { query: "", package_type: PACKAGE_TYPE, page: 1, per_page: 1, total: 1, results: 1 },
        Case { query: "gitea", package_type: PACKAGE_TYPE, page: 1, per_page: 1, total: 1, results: 1 },
        Case { query: "gitea", package_type: "dummycomposer", page: 1, per_page: 1, total: 0, results: 0 },
    ];

    for case in cases {
        let uri = format!(
            "{BASE}/search.json?q={}&type={}&page={}&per_page={}",
            case.query, case.package_type, case.page, case.per_page
        );
        let (status, body) = get_json(&app, &uri).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body["total"], case.total, "{uri}");
        assert_eq!(body["results"].as_array().unwrap().len(), case.results, "{uri}");
        if case.results == 1 {
            assert_eq!(body["results"][0]["name"], PACKAGE_NAME);
            assert_eq!(body["results"][0]["description"], "Package Description");
        }
    }
}

#[tokio::test]
async fn search_links_the_next_page() {
    let app = test_app();
    for name in ["acme/alpha", "acme/beta", "acme/gamma"] {
        let json = format!(r#"{{"name": "{name}"}}"#);
        let archive = zip_with(&[("composer.json", &json)]);
        let (status, _) = upload(&app, &format!("{BASE}?version=1.0.0"), archive).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, body) = get_json(&app, &format!("{BASE}/search.json?q=acme&per_page=2")).await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["results"][0]["name"], "acme/alpha");
    assert_eq!(body["results"][1]["name"], "acme/beta");
    let next = body["next"].as_str().unwrap();
    assert!(next.contains("page=2"));

    let (_, body) = get_json(&app, local_path(next)).await;
    assert_eq!(body["results"].as_array().unwrap().len(), 1);
    assert_eq!(body["results"][0]["name"], "acme/gamma");
    assert!(body.get("next").is_none());
}

#[tokio::test]
async fn list_enumerates_package_names() {
    let app = test_app();
    let (_, body) = get_json(&app, &format!("{BASE}/list.json")).await;
    assert_eq!(body["packageNames"], serde_json::json!([]));

    upload(&app, &format!("{BASE}?version=1.0.3"), package_zip()).await;
    let (status, body) = get_json(&app, &format!("{BASE}/list.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["packageNames"], serde_json::json!([PACKAGE_NAME]));

    // Other owners see nothing.
    let (_, body) = get_json(&app, "/api/packages/user3/composer/list.json").await;
    assert_eq!(body["packageNames"], serde_json::json!([]));
}

// -- Package metadata ---------------------------------------------------------

#[tokio::test]
async fn package_metadata_describes_the_version() {
    let app = test_app();
    let archive = package_zip();
    upload(&app, &format!("{BASE}?version=1.0.3"), archive.clone()).await;

    let (status, body) = get_json(&app, &format!("{BASE}/p2/{PACKAGE_NAME}.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["minified"], "composer/2.0");

    let versions = body["packages"][PACKAGE_NAME].as_array().unwrap();
    assert_eq!(versions.len(), 1);
    let entry = &versions[0];
    assert_eq!(entry["name"], PACKAGE_NAME);
    assert_eq!(entry["version"], "1.0.3");
    assert_eq!(entry["type"], PACKAGE_TYPE);
    assert_eq!(entry["description"], "Package Description");
    assert_eq!(entry["license"], serde_json::json!(["MIT"]));
    assert_eq!(entry["authors"][0]["name"], "Gitea Authors");
    assert!(entry["time"].as_str().is_some());
    assert_eq!(entry["dist"]["type"], "zip");
    assert_eq!(entry["dist"]["shasum"], sha1_hex(&archive));
}

fn listed_versions(document: &Value) -> Vec<String> {
    let mut versions: Vec<String> = document["packages"][PACKAGE_NAME]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["version"].as_str().unwrap().to_string())
        .collect();
    versions.sort();
    versions
}

#[tokio::test]
async fn metadata_lists_dev_versions_in_both_documents() {
    let app = test_app();
    upload(&app, &format!("{BASE}?version=1.0.3"), package_zip()).await;
    let (status, _) = upload(&app, &format!("{BASE}?version=1.0.0-dev"), package_zip()).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, stable) = get_json(&app, &format!("{BASE}/p2/{PACKAGE_NAME}.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed_versions(&stable), vec!["1.0.0-dev", "1.0.3"]);

    let (status, dev) = get_json(&app, &format!("{BASE}/p2/{PACKAGE_NAME}~dev.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed_versions(&dev), listed_versions(&stable));
}

#[tokio::test]
async fn four_part_versions_are_accepted() {
    let app = test_app();
    let (status, body) = upload(&app, &format!("{BASE}?version=1.0.0.0"), package_zip()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["version"], "1.0.0.0");

    let (_, metadata) = get_json(&app, &format!("{BASE}/p2/{PACKAGE_NAME}.json")).await;
    assert_eq!(listed_versions(&metadata), vec!["1.0.0.0"]);

    let (status, _) = upload(&app, &format!("{BASE}?version=v1.0.0.0"), package_zip()).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_metadata_is_404() {
    let app = test_app();
    upload(&app, &format!("{BASE}?version=1.0.3"), package_zip()).await;

    for uri in [
        format!("{BASE}/p2/gitea/unknown.json"),
        format!("{BASE}/p2/gitea/composer-package.xml"),
        format!("{BASE}/p2/gitea/.json"),
        "/api/packages/-invalid/composer/p2/gitea/composer-package.json".to_string(),
    ] {
        let (status, _) = get(&app, &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    }
}

// -- Authentication -----------------------------------------------------------

#[tokio::test]
async fn anonymous_upload_gets_basic_challenge() {
    let app = test_app_with_auth("s3cret");
    let (status, headers, _) = send(
        &app,
        upload_request(&format!("{BASE}?version=1.0.3"), package_zip(), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(headers[header::WWW_AUTHENTICATE]
        .to_str()
        .unwrap()
        .starts_with("Basic"));
}

#[tokio::test]
async fn other_user_cannot_publish() {
    let app = test_app_with_auth("s3cret");
    let (status, _, _) = send(
        &app,
        upload_request(
            &format!("{BASE}?version=1.0.3"),
            package_zip(),
            Some("Bearer user3:s3cret"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn bad_credentials_are_rejected() {
    let app = test_app_with_auth("s3cret");
    let (status, _, _) = send(
        &app,
        upload_request(
            &format!("{BASE}?version=1.0.3"),
            package_zip(),
            Some("Bearer user2:wrong"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn owner_and_admin_can_publish() {
    let app = test_app_with_auth("s3cret");

    // Basic base64("user2:s3cret")
    let (status, _, _) = send(
        &app,
        upload_request(
            &format!("{BASE}?version=1.0.3"),
            package_zip(),
            Some("Basic dXNlcjI6czNjcmV0"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, _) = send(
        &app,
        upload_request(
            &format!("{BASE}?version=1.0.4"),
            package_zip(),
            Some("Bearer s3cret"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Reads stay open to anonymous clients.
    let (status, body) = get_json(&app, &format!("{BASE}/list.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["packageNames"], serde_json::json!([PACKAGE_NAME]));
}

// -- Operational routes -------------------------------------------------------

#[tokio::test]
async fn health_probes_bypass_auth() {
    let app = test_app_with_auth("s3cret");
    let (status, body) = get(&app, "/health/liveness").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"ok");
    let (status, body) = get(&app, "/health/readiness").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"ready");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = test_app();
    let (status, body) = get_json(&app, "/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]
        .as_object()
        .unwrap()
        .contains_key("/api/packages/{owner}/composer/search.json"));
}

#[tokio::test]
async fn metrics_route_follows_configuration() {
    let (status, _) = get(&test_app(), "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
    let app = depot_api::app(AppState::new().with_metrics(recorder.handle()));
    let (status, _) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
}

//! # Composer Repository Views
//!
//! Response bodies of the Composer v2 repository protocol, built from
//! catalog records. Every URL is rooted at the owner-scoped base
//! `{app_url}api/packages/{owner}/composer`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use depot_catalog::{SearchPage, VersionDescriptor};
use depot_core::OwnerName;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::metadata::{Metadata, PROPERTY_TYPE};

/// Value of `minified` in package metadata responses.
pub const MINIFIED_FORMAT: &str = "composer/2.0";

/// Characters left unescaped in a path segment (RFC 3986 unreserved).
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// URL builder for one owner's Composer repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposerUrls {
    base: String,
}

impl ComposerUrls {
    /// `app_url` is the public root of the service; a missing trailing
    /// slash is added.
    pub fn new(app_url: &str, owner: &OwnerName) -> Self {
        let root = app_url.trim_end_matches('/');
        Self {
            base: format!("{root}/api/packages/{owner}/composer"),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Download URL of a file, each segment path-escaped.
    pub fn download_url(&self, package: &str, version: &str, file_name: &str) -> String {
        format!(
            "{}/files/{}/{}/{}",
            self.base,
            utf8_percent_encode(package, PATH_SEGMENT),
            utf8_percent_encode(version, PATH_SEGMENT),
            utf8_percent_encode(file_name, PATH_SEGMENT),
        )
    }

    /// Search URL for a concrete page.
    pub fn search_url(&self, query: &str, package_type: &str, page: usize, per_page: usize) -> String {
        let params = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("q", query)
            .append_pair("type", package_type)
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &per_page.to_string())
            .finish();
        format!("{}/search.json?{params}", self.base)
    }
}

// ---------------------------------------------------------------------------
// Service index
// ---------------------------------------------------------------------------

/// `packages.json`: where the client finds everything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ServiceIndexResponse {
    #[serde(rename = "search")]
    pub search_template: String,
    #[serde(rename = "metadata-url")]
    pub metadata_template: String,
    #[serde(rename = "list")]
    pub package_list: String,
}

pub fn service_index(urls: &ComposerUrls) -> ServiceIndexResponse {
    let base = urls.base();
    ServiceIndexResponse {
        search_template: format!("{base}/search.json?q=%query%&type=%type%"),
        metadata_template: format!("{base}/p2/%package%.json"),
        package_list: format!("{base}/list.json"),
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SearchResultResponse {
    pub total: u64,
    pub results: Vec<SearchResult>,
    #[serde(rename = "next", default, skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SearchResult {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub downloads: u64,
}

/// Render a search page. `query` and `package_type` are echoed into the
/// `next` link as the client sent them.
pub fn search_results(
    urls: &ComposerUrls,
    page: &SearchPage,
    query: &str,
    package_type: &str,
) -> SearchResultResponse {
    let results = page
        .packages
        .iter()
        .map(|summary| SearchResult {
            name: summary.package.name.clone(),
            description: summary
                .latest
                .metadata
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or_default()
                .to_string(),
            downloads: summary.downloads,
        })
        .collect();

    let next_link = page.has_next().then(|| {
        urls.search_url(
            query,
            package_type,
            page.paginator.page() + 1,
            page.paginator.per_page(),
        )
    });

    SearchResultResponse {
        total: page.total as u64,
        results,
        next_link,
    }
}

// ---------------------------------------------------------------------------
// Enumeration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PackageListResponse {
    #[serde(rename = "packageNames")]
    pub package_names: Vec<String>,
}

// ---------------------------------------------------------------------------
// Package metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PackageMetadataResponse {
    pub minified: String,
    pub packages: BTreeMap<String, Vec<PackageVersionMetadata>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PackageVersionMetadata {
    pub name: String,
    pub version: String,
    #[serde(rename = "time")]
    pub created: DateTime<Utc>,
    pub dist: Dist,
    #[serde(flatten)]
    pub metadata: Metadata,
}

/// Where and how to fetch a version's archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Dist {
    #[serde(rename = "type")]
    pub dist_type: String,
    pub url: String,
    /// SHA-1 hex of the archive, as verified by Composer clients.
    #[serde(rename = "shasum")]
    pub checksum: String,
}

/// Project name addressed by a `p2` file name.
///
/// `{project}.json` and `{project}~dev.json` name the same document: both
/// list every version of the package. Returns `None` for anything else.
pub fn project_from_file_name(file_name: &str) -> Option<&str> {
    let stem = file_name.strip_suffix(".json")?;
    let project = stem.strip_suffix("~dev").unwrap_or(stem);
    (!project.is_empty()).then_some(project)
}

fn version_metadata(descriptor: &VersionDescriptor) -> Metadata {
    let mut metadata = match serde_json::from_value::<Metadata>(descriptor.version.metadata.clone()) {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::warn!(
                version = %descriptor.version.id,
                error = %e,
                "stored composer metadata is unreadable, serving defaults"
            );
            let mut fallback = Metadata::default();
            if let Some(kind) = descriptor.version.properties.get(PROPERTY_TYPE) {
                fallback.package_type = kind.clone();
            }
            fallback
        }
    };
    metadata.readme = None;
    metadata
}

/// Render the `p2` metadata document for one package.
///
/// Every version is listed, pre-releases included. Versions without a lead
/// file are skipped.
pub fn package_metadata(
    urls: &ComposerUrls,
    package_name: &str,
    versions: &[VersionDescriptor],
) -> PackageMetadataResponse {
    let entries = versions
        .iter()
        .filter_map(|d| {
            let Some(lead) = d.lead_file() else {
                tracing::warn!(version = %d.version.id, "composer version has no lead file");
                return None;
            };
            Some(PackageVersionMetadata {
                name: d.package.name.clone(),
                version: d.version.version.clone(),
                created: d.version.created_at,
                dist: Dist {
                    dist_type: "zip".to_string(),
                    url: urls.download_url(
                        &d.package.lower_name,
                        &d.version.lower_version,
                        &lead.lower_name,
                    ),
                    checksum: lead.hashes.sha1.clone(),
                },
                metadata: version_metadata(d),
            })
        })
        .collect();

    PackageMetadataResponse {
        minified: MINIFIED_FORMAT.to_string(),
        packages: BTreeMap::from([(package_name.to_string(), entries)]),
    }
}

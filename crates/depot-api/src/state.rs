//! # Application State
//!
//! Shared state handed to every handler: the registry core, the ecosystem
//! adapters, configuration, and the Prometheus handle when metrics are on.

use depot_blob::BlobStore;
use depot_catalog::Catalog;
use depot_composer::ComposerEcosystem;
use depot_registry::Registry;
use metrics_exporter_prometheus::PrometheusHandle;

/// Default cap on upload bodies: 256 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Application configuration.
///
/// Custom `Debug` redacts the `auth_token` to prevent credential leakage in logs.
#[derive(Clone)]
pub struct AppConfig {
    /// Public root URL, always ending in `/`. Download and search links
    /// in responses are built from it.
    pub app_url: String,
    /// Shared secret for authentication. If `None`, authentication is disabled.
    pub auth_token: Option<String>,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    /// Normalize `app_url` to end with exactly one `/`.
    pub fn with_app_url(mut self, app_url: &str) -> Self {
        self.app_url = format!("{}/", app_url.trim_end_matches('/'));
        self
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("app_url", &self.app_url)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_url: "http://localhost:8080/".to_string(),
            auth_token: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Shared application state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub composer: ComposerEcosystem,
    pub config: AppConfig,
    /// Rendered at `/metrics`; `None` disables the route.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// In-memory blobs and catalog with default configuration.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    /// In-memory blobs and catalog with the given configuration.
    pub fn with_config(config: AppConfig) -> Self {
        Self::with_registry(
            config,
            Registry::new(BlobStore::in_memory(), Catalog::in_memory()),
        )
    }

    pub fn with_registry(config: AppConfig, registry: Registry) -> Self {
        Self {
            registry,
            composer: ComposerEcosystem,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("blobs", &self.registry.blobs().len())
            .field("database", &self.registry.catalog().pool().is_some())
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

//! # depot-api: Binary Entry Point
//!
//! Starts the Axum HTTP server for the package registry.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Parser, ValueEnum};
use depot_blob::BlobStore;
use depot_catalog::Catalog;
use depot_registry::Registry;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use depot_api::state::{AppConfig, AppState, DEFAULT_MAX_UPLOAD_BYTES};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Depot package registry server.
#[derive(Parser)]
#[command(name = "depot-api", version, about, long_about = None)]
struct Cli {
    /// Port to listen on.
    #[arg(long, env = "DEPOT_PORT", default_value_t = 8080)]
    port: u16,

    /// Public root URL used in generated links. Defaults to http://localhost:{port}/.
    #[arg(long, env = "DEPOT_APP_URL")]
    app_url: Option<String>,

    /// Shared secret. Unset disables authentication.
    #[arg(long, env = "DEPOT_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// Directory for blob files. Unset keeps blobs in memory.
    #[arg(long, env = "DEPOT_STORAGE_PATH")]
    storage_path: Option<PathBuf>,

    /// Postgres connection string. Unset keeps the catalog in memory.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    #[arg(long, env = "DEPOT_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,

    /// Seconds between blob garbage collection runs; 0 disables it.
    #[arg(long, env = "DEPOT_GC_INTERVAL_SECS", default_value_t = 0)]
    gc_interval_secs: u64,

    /// Serve Prometheus metrics at /metrics.
    #[arg(long = "metrics", env = "DEPOT_METRICS_ENABLED", default_value_t = true, action = ArgAction::Set)]
    metrics: bool,

    #[arg(long, env = "DEPOT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl std::fmt::Debug for Cli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cli")
            .field("port", &self.port)
            .field("app_url", &self.app_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("storage_path", &self.storage_path)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("gc_interval_secs", &self.gc_interval_secs)
            .field("metrics", &self.metrics)
            .field("log_format", &self.log_format)
            .finish()
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    tracing::debug!(config = ?cli, "starting depot-api");

    let app_url = cli
        .app_url
        .clone()
        .unwrap_or_else(|| format!("http://localhost:{}/", cli.port));
    let config = AppConfig {
        auth_token: cli.auth_token.clone(),
        max_upload_bytes: cli.max_upload_bytes,
        ..AppConfig::default()
    }
    .with_app_url(&app_url);
    if config.auth_token.is_none() {
        tracing::warn!("DEPOT_AUTH_TOKEN is unset; every request acts as administrator");
    }

    let blobs = match &cli.storage_path {
        Some(root) => {
            std::fs::create_dir_all(root)
                .with_context(|| format!("creating storage directory {}", root.display()))?;
            tracing::info!(path = %root.display(), "blob store on filesystem");
            BlobStore::filesystem(root.clone())
        }
        None => {
            tracing::info!("blob store in memory");
            BlobStore::in_memory()
        }
    };

    let catalog = match depot_catalog::db::init_pool(cli.database_url.as_deref())
        .await
        .context("database initialization failed")?
    {
        Some(pool) => Catalog::with_pool(pool),
        None => {
            tracing::info!("catalog in memory");
            Catalog::in_memory()
        }
    };

    let registry = Registry::new(blobs, catalog);
    let summary = registry
        .hydrate()
        .await
        .context("catalog hydration failed")?;
    if summary.files > 0 {
        tracing::info!(
            files = summary.files,
            missing_blobs = summary.missing_blobs,
            "catalog hydrated from database"
        );
    }

    let mut state = AppState::with_registry(config, registry.clone());
    if cli.metrics {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("installing Prometheus recorder")?;
        state = state.with_metrics(handle);
    }

    if cli.gc_interval_secs > 0 {
        spawn_gc(registry, Duration::from_secs(cli.gc_interval_secs));
    }

    let app = depot_api::app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, app_url = %app_url, "depot-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("depot-api stopped");
    Ok(())
}

/// Periodically delete blobs no file references any more.
fn spawn_gc(registry: Registry, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let registry = registry.clone();
            match tokio::task::spawn_blocking(move || registry.collect_garbage()).await {
                Ok(0) => {}
                Ok(deleted) => tracing::info!(deleted, "blob garbage collection"),
                Err(e) => tracing::error!(error = %e, "blob garbage collection task failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining connections");
}

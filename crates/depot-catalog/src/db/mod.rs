//! # Database Persistence Layer
//!
//! Optional Postgres persistence for the catalog via SQLx.
//!
//! When a database URL is configured, every catalog mutation is written
//! through to Postgres inside a transaction *before* the in-memory state is
//! updated, and the in-memory state is rebuilt from the database at startup.
//! Without a URL the catalog runs in-memory only (development and tests).
//!
//! Blob bytes are never stored here; `package_files` references them by
//! SHA-256 digest.

pub mod packages;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Connect to Postgres and run embedded migrations.
///
/// Returns `None` when no URL is configured (in-memory-only mode).
pub async fn init_pool(database_url: Option<&str>) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = database_url else {
        tracing::warn!(
            "DATABASE_URL not set, running in-memory only mode. \
             Catalog state will not survive restarts."
        );
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

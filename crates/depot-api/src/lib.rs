//! # depot-api: Axum API Services for the Depot Registry
//!
//! HTTP surface of the package registry. Every ecosystem is served under an
//! owner-scoped prefix; the registry core does the storage work.
//!
//! ## API Surface
//!
//! | Prefix                              | Module                 | Domain            |
//! |-------------------------------------|------------------------|-------------------|
//! | `/api/packages/{owner}/composer/*`  | [`routes::composer`]   | Composer v2       |
//! | `/health/*`                         | (this module)          | Probes            |
//! | `/metrics`                          | (this module)          | Prometheus scrape |
//! | `/openapi.json`                     | [`openapi`]            | API document      |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer -> MetricsMiddleware -> AuthMiddleware -> BodyLimit -> Handler
//! ```

pub mod auth;
pub mod error;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes, `/metrics` and `/openapi.json` are mounted outside the
/// auth middleware so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };

    let api = Router::new()
        .merge(routes::composer::router())
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(from_fn(auth::auth_middleware))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_config))
        .with_state(state.clone());

    let mut unauthenticated = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .merge(openapi::router());

    if state.metrics.is_some() {
        unauthenticated = unauthenticated.route("/metrics", get(prometheus_metrics));
    }

    Router::new()
        .merge(unauthenticated.with_state(state))
        .merge(api)
}

/// Liveness probe: 200 while the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 when the database (if configured) answers.
async fn readiness(State(state): State<AppState>) -> Response {
    if let Some(pool) = state.registry.catalog().pool() {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!(error = %e, "database health check failed");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response();
        }
    }
    (StatusCode::OK, "ready").into_response()
}

/// GET /metrics: Prometheus text exposition.
async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

//! # Prometheus Metrics
//!
//! HTTP-level metrics recorded through the `metrics` facade. The binary
//! installs a `metrics-exporter-prometheus` recorder and `/metrics` renders
//! its handle; without a recorder every call here is a no-op.
//!
//! Requests are labelled by their matched route template (for example
//! `/api/packages/{owner}/composer/search.json`), never the raw path, so
//! owner and package names do not explode label cardinality.

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;

const UNMATCHED: &str = "unmatched";

/// Record one finished request.
pub fn record_request(method: &str, route: &str, status: u16, duration_secs: f64) {
    let status = status.to_string();
    metrics::counter!(
        "depot_http_requests_total",
        "method" => method.to_owned(),
        "route" => route.to_owned(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "depot_http_request_duration_seconds",
        "method" => method.to_owned(),
        "route" => route.to_owned()
    )
    .record(duration_secs);
}

/// Middleware that records HTTP request metrics.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| UNMATCHED.to_owned());
    let start = Instant::now();

    let response = next.run(request).await;

    record_request(
        &method,
        &route,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

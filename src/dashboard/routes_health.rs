//! # Health & Observability Endpoints
//!
//! | Endpoint | Purpose |
//! |----------|---------|
//! | `GET /healthz` | Liveness: process is alive |
//! | `GET /readyz` | Readiness: database reachable |
//! | `GET /metrics` | Prometheus scraping endpoint |
//!
//! The readiness probe performs a `SELECT 1` with a 2-second timeout and
//! answers 503 while the database is unreachable.

use super::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use std::sync::Arc;

/// Liveness probe: returns 200 if the process is running.
pub async fn handler_healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe: returns 200 if the database answers within 2 seconds.
pub async fn handler_readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let check =
        tokio::time::timeout(std::time::Duration::from_secs(2), state.db.health_check()).await;

    match check {
        Ok(Ok(())) => (StatusCode::OK, "ok"),
        Ok(Err(_)) => (StatusCode::SERVICE_UNAVAILABLE, "database unreachable"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "database timeout"),
    }
}

/// Prometheus metrics endpoint. Pool gauges are sampled at scrape time.
pub async fn handler_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let pool = state.db.pool();
    state.prom_metrics.db_pool_connections.set(pool.size() as i64);
    state
        .prom_metrics
        .db_pool_idle_connections
        .set(pool.num_idle() as i64);
    let body = state.prom_metrics.encode();
    (
        StatusCode::OK,
        [(
            "content-type",
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        body,
    )
}

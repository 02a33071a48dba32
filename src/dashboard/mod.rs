//! # Dashboard: CRF Builder HTTP Server
//!
//! Runs an Axum HTTP server exposing the CRF builder API: study records, the
//! three structural endpoints backed by the synchronizer, direct form/field
//! CRUD, and health/metrics probes.
//!
//! Responses are JSON. Mutations answer with a flash envelope
//! (`{"flash": {"level", "message"}, ...}`); see [`flash`].

mod flash;
mod routes_forms;
mod routes_health;
mod routes_structure;
mod routes_studies;

use crate::config::AppConfig;
use crate::{db, prom_metrics};
use anyhow::Result;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Instrument};

pub struct AppState {
    pub db: db::Database,
    pub config: AppConfig,
    pub prom_metrics: prom_metrics::Metrics,
}

impl AppState {
    pub fn new(db: db::Database, config: AppConfig) -> Arc<Self> {
        Arc::new(AppState {
            db,
            config,
            prom_metrics: prom_metrics::Metrics::new(),
        })
    }
}

/// Middleware that records HTTP request duration into the Prometheus histogram,
/// generates (or propagates) a request ID for correlation, and wraps the
/// request in a tracing span using `.instrument()` for proper async propagation.
async fn metrics_middleware(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> axum::response::Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = req.method().to_string();
    let raw_path = req.uri().path().to_string();
    let norm_path = normalize_path(&raw_path);
    let start = std::time::Instant::now();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %raw_path,
    );
    let mut response = next.run(req).instrument(span).await;

    let duration = start.elapsed().as_secs_f64();
    state
        .prom_metrics
        .http_request_duration
        .get_or_create(&prom_metrics::HttpLabel {
            method,
            path: norm_path,
        })
        .observe(duration);

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Normalize URL path to collapse high-cardinality segments (UUIDs, numeric IDs)
/// into placeholders, preventing histogram label explosion.
///
/// Protocol codes are free-form, so the segment after `/studies/` is always
/// collapsed too.
fn normalize_path(path: &str) -> String {
    let mut after_studies = false;
    path.split('/')
        .map(|seg| {
            let collapsed = if seg.is_empty() {
                seg.to_string()
            } else if after_studies {
                ":code".to_string()
            } else if seg.chars().all(|c| c.is_ascii_digit()) {
                ":id".to_string()
            } else if crate::identity::is_canonical_uuid(seg) {
                ":uuid".to_string()
            } else {
                seg.to_string()
            };
            after_studies = seg == "studies";
            collapsed
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let server = &state.config.server;
    let body_limit = server.max_body_bytes;
    let timeout = Duration::from_secs(server.request_timeout_secs);

    Router::new()
        .route("/healthz", get(routes_health::handler_healthz))
        .route("/readyz", get(routes_health::handler_readyz))
        .route("/metrics", get(routes_health::handler_metrics))
        // Studies
        .route("/studies", post(routes_studies::handler_study_create))
        .route(
            "/studies/{protocol_code}",
            get(routes_studies::handler_study_get).put(routes_studies::handler_study_update),
        )
        .route(
            "/studies/{protocol_code}/audits",
            get(routes_studies::handler_study_audits),
        )
        // Structure synchronization
        .route(
            "/studies/{protocol_code}/crf-builder/structure",
            get(routes_structure::handler_structure_get)
                .post(routes_structure::handler_structure_sync),
        )
        .route(
            "/forms/{form_id}",
            get(routes_structure::handler_form_get)
                .put(routes_structure::handler_form_sync)
                .patch(routes_forms::handler_form_patch)
                .delete(routes_forms::handler_form_delete),
        )
        .route(
            "/forms/{form_id}/sections/reorder-simple",
            post(routes_structure::handler_sections_reorder),
        )
        // Direct form/field CRUD
        .route(
            "/studies/{protocol_code}/forms",
            post(routes_forms::handler_form_create),
        )
        .route(
            "/sections/{section_id}/fields",
            post(routes_forms::handler_field_create),
        )
        .route(
            "/sections/{section_id}/fields/renormalize",
            post(routes_forms::handler_fields_renormalize),
        )
        .route(
            "/fields/{field_id}",
            axum::routing::delete(routes_forms::handler_field_delete),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(CatchPanicLayer::new())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .with_state(state)
}

pub async fn run(database_url: &str, config: AppConfig) -> Result<()> {
    let database = db::Database::connect(database_url, config.database.max_connections).await?;
    database.migrate().await?;
    let port = config.server.port;
    let state = AppState::new(database, config);
    let app = build_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "crf builder running");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("crf builder shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
                info!("received SIGINT, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT, shutting down");
    }
}

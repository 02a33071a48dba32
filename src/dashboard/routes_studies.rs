//! Study API: create, read, audited update, audit trail.
//!
//! Updates require the acting user in the `x-user-id` header and a `reason`
//! in the body; both are recorded on every audit row the update produces.

use axum::body::Bytes;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::{flash, AppState};
use crate::db::StudyInput;

/// POST /studies
pub(super) async fn handler_study_create(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> impl IntoResponse {
    let input: StudyInput = match flash::parse_body(&body) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    match state.db.create_study(&input).await {
        Ok(study) => (
            StatusCode::CREATED,
            flash::success("Study created", json!({"study": study})),
        )
            .into_response(),
        Err(e) => flash::sync_error(&e),
    }
}

/// GET /studies/{protocol_code}
pub(super) async fn handler_study_get(
    State(state): State<Arc<AppState>>,
    AxumPath(protocol_code): AxumPath<String>,
) -> impl IntoResponse {
    match state.db.get_study_detail(&protocol_code).await {
        Ok(Some(study)) => Json(json!(study)).into_response(),
        Ok(None) => flash::not_found("study", &protocol_code),
        Err(e) => flash::internal(e),
    }
}

#[derive(Deserialize)]
pub(super) struct StudyUpdateBody {
    #[serde(flatten)]
    study: StudyInput,
    reason: Option<String>,
}

fn acting_user(headers: &HeaderMap) -> Option<i64> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// PUT /studies/{protocol_code}: full-record update with a mandatory reason.
pub(super) async fn handler_study_update(
    State(state): State<Arc<AppState>>,
    AxumPath(protocol_code): AxumPath<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(user_id) = acting_user(&headers) else {
        return flash::error(StatusCode::UNAUTHORIZED, "x-user-id header is required");
    };
    let request: StudyUpdateBody = match flash::parse_body(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let result = state
        .db
        .update_study(
            &protocol_code,
            &request.study,
            request.reason.as_deref(),
            user_id,
            &state.config.audit,
        )
        .await;
    match result {
        Ok(outcome) => {
            state.prom_metrics.audit_records.inc_by(outcome.audits.len() as u64);
            flash::success("Study updated", json!(outcome))
        }
        Err(e) => flash::sync_error(&e),
    }
}

#[derive(Deserialize)]
pub(super) struct AuditQuery {
    limit: Option<i64>,
}

/// GET /studies/{protocol_code}/audits: newest first.
pub(super) async fn handler_study_audits(
    State(state): State<Arc<AppState>>,
    AxumPath(protocol_code): AxumPath<String>,
    Query(params): Query<AuditQuery>,
) -> impl IntoResponse {
    let study = match state.db.get_study_by_code(&protocol_code).await {
        Ok(Some(study)) => study,
        Ok(None) => return flash::not_found("study", &protocol_code),
        Err(e) => return flash::internal(e),
    };
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);
    match state.db.get_study_audits(study.id, limit).await {
        Ok(rows) => Json(json!(rows)).into_response(),
        Err(e) => flash::internal(e),
    }
}

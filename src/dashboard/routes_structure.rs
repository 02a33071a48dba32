//! CRF structure API: whole-study structure sync, form sync, section reorder,
//! and the matching read endpoints.
//!
//! Payloads are validated before the synchronizer opens its transaction; a
//! failed sync is rolled back entirely and reported as an error flash.

use axum::body::Bytes;
use axum::extract::{Path as AxumPath, State};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::{flash, AppState};
use crate::db::SyncSummary;
use crate::error::SyncError;
use crate::structure::{
    validate_form, validate_section_order, validate_study_structure, FormPayload,
    SectionOrderPayload, StructurePayload,
};

fn parse_form_id(raw: &str) -> Result<Uuid, Response> {
    if !crate::identity::is_canonical_uuid(raw) {
        return Err(flash::not_found("form", raw));
    }
    Uuid::parse_str(raw).map_err(|_| flash::not_found("form", raw))
}

fn respond(
    state: &AppState,
    operation: &str,
    message: &str,
    redirect: String,
    result: Result<SyncSummary, SyncError>,
) -> Response {
    match result {
        Ok(summary) => {
            state.prom_metrics.record_sync(operation, Ok(&summary));
            flash::success(
                message,
                json!({
                    "redirect": redirect,
                    "revision": summary.revision,
                    "summary": summary,
                }),
            )
        }
        Err(e) => {
            state.prom_metrics.record_sync(operation, Err(e.kind()));
            flash::sync_error(&e)
        }
    }
}

/// GET /studies/{protocol_code}/crf-builder/structure
pub(super) async fn handler_structure_get(
    State(state): State<Arc<AppState>>,
    AxumPath(protocol_code): AxumPath<String>,
) -> impl IntoResponse {
    match state.db.get_study_structure(&protocol_code).await {
        Ok(Some(structure)) => axum::Json(json!(structure)).into_response(),
        Ok(None) => flash::not_found("study", &protocol_code),
        Err(e) => flash::sync_error(&e),
    }
}

/// POST /studies/{protocol_code}/crf-builder/structure: replace visits and subsections.
pub(super) async fn handler_structure_sync(
    State(state): State<Arc<AppState>>,
    AxumPath(protocol_code): AxumPath<String>,
    body: Bytes,
) -> impl IntoResponse {
    let payload: StructurePayload = match flash::parse_body(&body) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let result = match validate_study_structure(&payload, state.config.sync.require_revision) {
        Ok(tree) => state.db.sync_study_structure(&protocol_code, &tree).await,
        Err(e) => Err(e),
    };
    respond(
        &state,
        "study_structure",
        "Study structure saved",
        format!("/studies/{}/crf-builder", protocol_code),
        result,
    )
}

/// GET /forms/{form_id}
pub(super) async fn handler_form_get(
    State(state): State<Arc<AppState>>,
    AxumPath(form_id): AxumPath<String>,
) -> impl IntoResponse {
    let form_id = match parse_form_id(&form_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.db.get_form_view(form_id).await {
        Ok(Some(form)) => axum::Json(json!(form)).into_response(),
        Ok(None) => flash::not_found("form", &form_id.to_string()),
        Err(e) => flash::sync_error(&e),
    }
}

/// PUT /forms/{form_id}: replace the form title, sections and fields.
pub(super) async fn handler_form_sync(
    State(state): State<Arc<AppState>>,
    AxumPath(form_id): AxumPath<String>,
    body: Bytes,
) -> impl IntoResponse {
    let form_id = match parse_form_id(&form_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let payload: FormPayload = match flash::parse_body(&body) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let result = match validate_form(&payload, state.config.sync.require_revision) {
        Ok(tree) => state.db.sync_form(form_id, &tree).await,
        Err(e) => Err(e),
    };
    respond(
        &state,
        "form",
        "Form saved",
        format!("/forms/{}", form_id),
        result,
    )
}

/// POST /forms/{form_id}/sections/reorder-simple: sections only, fields untouched.
pub(super) async fn handler_sections_reorder(
    State(state): State<Arc<AppState>>,
    AxumPath(form_id): AxumPath<String>,
    body: Bytes,
) -> impl IntoResponse {
    let form_id = match parse_form_id(&form_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let payload: SectionOrderPayload = match flash::parse_body(&body) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let result = match validate_section_order(&payload, state.config.sync.require_revision) {
        Ok(order) => state.db.reorder_sections(form_id, &order).await,
        Err(e) => Err(e),
    };
    respond(
        &state,
        "section_order",
        "Sections reordered",
        format!("/forms/{}", form_id),
        result,
    )
}

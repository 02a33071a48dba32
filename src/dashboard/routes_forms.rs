//! Direct form and field CRUD. These edit one node at a time and do not go
//! through structure synchronization.

use axum::body::Bytes;
use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::{flash, AppState};
use crate::db::{FieldPlacement, FormPatch, NewForm};
use crate::error::SyncError;
use crate::structure::{validate_new_field, FieldPayload};

fn parse_uuid(entity: &str, raw: &str) -> Result<Uuid, Response> {
    if !crate::identity::is_canonical_uuid(raw) {
        return Err(flash::not_found(entity, raw));
    }
    Uuid::parse_str(raw).map_err(|_| flash::not_found(entity, raw))
}

/// POST /studies/{protocol_code}/forms: append a form.
pub(super) async fn handler_form_create(
    State(state): State<Arc<AppState>>,
    AxumPath(protocol_code): AxumPath<String>,
    body: Bytes,
) -> impl IntoResponse {
    let form: NewForm = match flash::parse_body(&body) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    match state.db.create_form(&protocol_code, &form).await {
        Ok(row) => flash::success("Form created", json!({"form": row})),
        Err(e) => flash::sync_error(&e),
    }
}

/// PATCH /forms/{form_id}: title, visibility, status, version.
pub(super) async fn handler_form_patch(
    State(state): State<Arc<AppState>>,
    AxumPath(form_id): AxumPath<String>,
    body: Bytes,
) -> impl IntoResponse {
    let form_id = match parse_uuid("form", &form_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let patch: FormPatch = match flash::parse_body(&body) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    match state.db.update_form_meta(form_id, &patch).await {
        Ok(row) => flash::success("Form updated", json!({"form": row})),
        Err(e) => flash::sync_error(&e),
    }
}

/// DELETE /forms/{form_id}: removes the form with its sections and fields.
pub(super) async fn handler_form_delete(
    State(state): State<Arc<AppState>>,
    AxumPath(form_id): AxumPath<String>,
) -> impl IntoResponse {
    let form_id = match parse_uuid("form", &form_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.db.delete_form(form_id).await {
        Ok(true) => flash::success("Form deleted", json!({})),
        Ok(false) => flash::not_found("form", &form_id.to_string()),
        Err(e) => flash::sync_error(&e),
    }
}

#[derive(Deserialize)]
pub(super) struct FieldCreateBody {
    #[serde(flatten)]
    field: FieldPayload,
    after: Option<String>,
    before: Option<String>,
}

impl FieldCreateBody {
    fn placement(&self) -> Result<FieldPlacement, SyncError> {
        let anchor = |key: &str, raw: &str| {
            if crate::identity::is_canonical_uuid(raw) {
                Uuid::parse_str(raw).map_err(|_| SyncError::field(key, "must be a field id"))
            } else {
                Err(SyncError::field(key, "must be a field id"))
            }
        };
        match (self.after.as_deref(), self.before.as_deref()) {
            (Some(_), Some(_)) => Err(SyncError::field(
                "placement",
                "give either after or before, not both",
            )),
            (Some(raw), None) => anchor("after", raw).map(FieldPlacement::After),
            (None, Some(raw)) => anchor("before", raw).map(FieldPlacement::Before),
            (None, None) => Ok(FieldPlacement::End),
        }
    }
}

/// POST /sections/{section_id}/fields: insert one field, optionally
/// `after` or `before` a sibling.
pub(super) async fn handler_field_create(
    State(state): State<Arc<AppState>>,
    AxumPath(section_id): AxumPath<String>,
    body: Bytes,
) -> impl IntoResponse {
    let section_id = match parse_uuid("section", &section_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let request: FieldCreateBody = match flash::parse_body(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let prepared = request
        .placement()
        .and_then(|placement| Ok((validate_new_field(&request.field)?, placement)));
    let (field, placement) = match prepared {
        Ok(p) => p,
        Err(e) => return flash::sync_error(&e),
    };
    match state.db.create_field(section_id, &field, placement).await {
        Ok(row) => (StatusCode::CREATED, flash::success("Field created", json!({"field": row})))
            .into_response(),
        Err(e) => flash::sync_error(&e),
    }
}

/// DELETE /fields/{field_id}
pub(super) async fn handler_field_delete(
    State(state): State<Arc<AppState>>,
    AxumPath(field_id): AxumPath<String>,
) -> impl IntoResponse {
    let field_id = match parse_uuid("field", &field_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.db.delete_field(field_id).await {
        Ok(true) => flash::success("Field deleted", json!({})),
        Ok(false) => flash::not_found("field", &field_id.to_string()),
        Err(e) => flash::sync_error(&e),
    }
}

/// POST /sections/{section_id}/fields/renormalize: rewrite field orders to 0..n.
pub(super) async fn handler_fields_renormalize(
    State(state): State<Arc<AppState>>,
    AxumPath(section_id): AxumPath<String>,
) -> impl IntoResponse {
    let section_id = match parse_uuid("section", &section_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.db.renormalize_section_fields(section_id).await {
        Ok(fields) => flash::success("Field order renormalized", json!({"fields": fields})),
        Err(e) => flash::sync_error(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(value: serde_json::Value) -> FieldCreateBody {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn placement_defaults_to_end() {
        let b = body(json!({"label": "Weight", "type": "number"}));
        assert_eq!(b.placement().unwrap(), FieldPlacement::End);
        assert_eq!(b.field.label.as_deref(), Some("Weight"));
    }

    #[test]
    fn placement_after_sibling() {
        let id = Uuid::new_v4();
        let b = body(json!({"label": "Weight", "after": id.to_string()}));
        assert_eq!(b.placement().unwrap(), FieldPlacement::After(id));
    }

    #[test]
    fn placement_rejects_both_anchors_and_bad_ids() {
        let id = Uuid::new_v4().to_string();
        assert!(body(json!({"after": id, "before": id})).placement().is_err());
        assert!(body(json!({"before": "new-1"})).placement().is_err());
    }
}

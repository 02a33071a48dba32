//! Flash-envelope responses.
//!
//! Every mutation answers `{"flash": {"level": "success"|"error", "message"}}`,
//! merged with the operation's own payload on success or with per-field
//! `errors` on validation failure.

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::SyncError;

pub(super) fn status_for(err: &SyncError) -> StatusCode {
    match err {
        SyncError::Validation(_) | SyncError::AuditPrecondition(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SyncError::NotFound { .. } => StatusCode::NOT_FOUND,
        SyncError::Conflict(_) => StatusCode::CONFLICT,
        SyncError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn envelope(level: &str, message: &str) -> Value {
    json!({"flash": {"level": level, "message": message}})
}

/// 200 with a success flash; object keys of `body` are merged alongside it.
pub(super) fn success(message: &str, body: Value) -> Response {
    let mut out = envelope("success", message);
    if let (Some(target), Value::Object(extra)) = (out.as_object_mut(), body) {
        target.extend(extra);
    }
    (StatusCode::OK, Json(out)).into_response()
}

pub(super) fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(envelope("error", message))).into_response()
}

pub(super) fn sync_error(err: &SyncError) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        warn!(kind = err.kind(), error = %err, "request failed");
    }
    let mut body = envelope("error", &err.to_string());
    if let (SyncError::Validation(errors), Some(target)) = (err, body.as_object_mut()) {
        target.insert("errors".to_string(), json!(errors));
    }
    (status, Json(body)).into_response()
}

/// Failures of plain reads, which carry no sync semantics.
pub(super) fn internal(err: anyhow::Error) -> Response {
    warn!(error = %err, "request failed");
    error(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
}

pub(super) fn not_found(entity: &str, key: &str) -> Response {
    error(StatusCode::NOT_FOUND, &format!("{} not found: {}", entity, key))
}

/// Parse a JSON body, answering malformed input with an error flash instead
/// of the extractor's plain-text rejection.
pub(super) fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    let slice: &[u8] = if body.is_empty() { b"{}" } else { &body[..] };
    serde_json::from_slice(slice).map_err(|e| {
        error(
            StatusCode::UNPROCESSABLE_ENTITY,
            &format!("invalid request body: {}", e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn status_mapping() {
        assert_eq!(
            status_for(&SyncError::field("title", "is required")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&SyncError::AuditPrecondition("short".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&SyncError::not_found("form", "x")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&SyncError::Conflict("stale".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&SyncError::from(sqlx::Error::PoolTimedOut)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[derive(Debug, Deserialize)]
    struct Sample {
        title: Option<String>,
    }

    #[test]
    fn empty_body_parses_as_empty_object() {
        let sample: Sample = parse_body(&Bytes::new()).unwrap();
        assert!(sample.title.is_none());
    }

    #[test]
    fn malformed_body_is_unprocessable() {
        let response = parse_body::<Sample>(&Bytes::from_static(b"{not json")).unwrap_err();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}

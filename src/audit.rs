//! Study audit diffing.
//!
//! Compares the serialized attributes of a study before and after an update and
//! yields one [`AuditEntry`] per changed attribute. Center membership is a set,
//! so it is compared separately and recorded as a single `centers` entry.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

use crate::error::SyncError;

/// Attributes never audited unless configuration says otherwise.
pub const DEFAULT_EXCLUDED_FIELDS: &[&str] =
    &["created_at", "updated_at", "id", "reason", "protocol_version"];

/// Field name used for center-association entries.
pub const CENTERS_FIELD: &str = "centers";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Check the mandatory edit reason, returning it trimmed.
pub fn validate_reason(reason: Option<&str>, min_len: usize) -> Result<&str, SyncError> {
    let trimmed = reason.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Err(SyncError::AuditPrecondition(
            "a reason for the change is required".to_string(),
        ));
    }
    if trimmed.chars().count() < min_len {
        return Err(SyncError::AuditPrecondition(format!(
            "reason must be at least {} characters",
            min_len
        )));
    }
    Ok(trimmed)
}

/// Render a JSON attribute value for storage in an audit row.
fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Diff two attribute snapshots (JSON objects), skipping excluded attributes.
///
/// Entries come out in the key order of `new`, followed by keys only present
/// in `old` (reported with a `None` new value).
pub fn diff_attributes<S: AsRef<str>>(old: &Value, new: &Value, excluded: &[S]) -> Vec<AuditEntry> {
    let is_excluded = |key: &str| excluded.iter().any(|e| e.as_ref() == key);
    let empty = serde_json::Map::new();
    let old_map = old.as_object().unwrap_or(&empty);
    let new_map = new.as_object().unwrap_or(&empty);

    let mut entries = Vec::new();
    for (key, new_value) in new_map {
        if is_excluded(key) {
            continue;
        }
        let old_value = old_map.get(key).unwrap_or(&Value::Null);
        if old_value != new_value {
            entries.push(AuditEntry {
                field_name: key.clone(),
                old_value: render(old_value),
                new_value: render(new_value),
            });
        }
    }
    for (key, old_value) in old_map {
        if is_excluded(key) || new_map.contains_key(key) || old_value.is_null() {
            continue;
        }
        entries.push(AuditEntry {
            field_name: key.clone(),
            old_value: render(old_value),
            new_value: None,
        });
    }
    entries
}

/// Compare center memberships by id; on change, produce a single entry whose
/// values are the joined, name-sorted center names.
pub fn diff_centers(old: &[(i64, String)], new: &[(i64, String)]) -> Option<AuditEntry> {
    let old_ids: BTreeSet<i64> = old.iter().map(|(id, _)| *id).collect();
    let new_ids: BTreeSet<i64> = new.iter().map(|(id, _)| *id).collect();
    if old_ids == new_ids {
        return None;
    }
    Some(AuditEntry {
        field_name: CENTERS_FIELD.to_string(),
        old_value: joined_names(old),
        new_value: joined_names(new),
    })
}

fn joined_names(centers: &[(i64, String)]) -> Option<String> {
    if centers.is_empty() {
        return None;
    }
    let mut names: Vec<&str> = centers.iter().map(|(_, name)| name.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    Some(names.join(", "))
}

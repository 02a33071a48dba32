//! Error taxonomy for structural edits and study updates.

use std::collections::BTreeMap;

use thiserror::Error;

/// Per-field validation messages keyed by payload path (e.g. `visits.0.title`).
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Payload rejected before any transaction was opened.
    #[error("validation failed: {}", summarize(.0))]
    Validation(FieldErrors),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Stale revision token, or an identifier that belongs to another parent.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Missing or too-short edit reason on a study update.
    #[error("audit precondition failed: {0}")]
    AuditPrecondition(String),

    /// Any storage failure inside the transaction; the whole call was rolled back.
    #[error("structure synchronization failed: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl SyncError {
    pub fn field(path: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.entry(path.into()).or_default().push(message.into());
        SyncError::Validation(errors)
    }

    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        SyncError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Short machine-readable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Validation(_) => "validation",
            SyncError::NotFound { .. } => "not_found",
            SyncError::Conflict(_) => "conflict",
            SyncError::AuditPrecondition(_) => "audit_precondition",
            SyncError::Persistence(_) => "persistence",
        }
    }

    /// True if the underlying database error is a unique-constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            SyncError::Persistence(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}

fn summarize(errors: &FieldErrors) -> String {
    errors
        .iter()
        .map(|(field, messages)| format!("{}: {}", field, messages.join("; ")))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Accumulates validation messages while walking a payload.
#[derive(Debug, Default)]
pub struct Collector {
    errors: FieldErrors,
}

impl Collector {
    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(path.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(value)` if nothing was collected, otherwise a validation error.
    pub fn finish<T>(self, value: T) -> Result<T, SyncError> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(SyncError::Validation(self.errors))
        }
    }
}

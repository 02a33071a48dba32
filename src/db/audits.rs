//! Study audit trail: append and list. Rows are never updated or deleted.

use anyhow::Result;
use sqlx::PgConnection;

use super::{Database, StudyAuditRow};
use crate::audit::AuditEntry;

/// Append one row per entry, all carrying the same user and reason.
pub(super) async fn insert_audit_entries(
    conn: &mut PgConnection,
    study_id: i64,
    user_id: i64,
    reason: &str,
    entries: &[AuditEntry],
) -> Result<Vec<StudyAuditRow>, sqlx::Error> {
    let mut rows = Vec::with_capacity(entries.len());
    for entry in entries {
        let row = sqlx::query_as::<_, StudyAuditRow>(
            "INSERT INTO study_audits (study_id, user_id, field_name, old_value, new_value, reason)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, study_id, user_id, field_name, old_value, new_value, reason, created_at",
        )
        .bind(study_id)
        .bind(user_id)
        .bind(&entry.field_name)
        .bind(&entry.old_value)
        .bind(&entry.new_value)
        .bind(reason)
        .fetch_one(&mut *conn)
        .await?;
        rows.push(row);
    }
    Ok(rows)
}

impl Database {
    /// Audit rows of a study, newest first.
    pub async fn get_study_audits(&self, study_id: i64, limit: i64) -> Result<Vec<StudyAuditRow>> {
        let rows = sqlx::query_as::<_, StudyAuditRow>(
            "SELECT id, study_id, user_id, field_name, old_value, new_value, reason, created_at
             FROM study_audits WHERE study_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2",
        )
        .bind(study_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

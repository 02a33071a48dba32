//! Study records, center membership, and the audited update path.
//!
//! `update_study` is the only mutation that writes `study_audits`: the reason is
//! checked before a transaction is opened, then the study row is locked, updated,
//! diffed against its previous snapshot, and every changed attribute is appended
//! to the audit trail in the same transaction.

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::PgConnection;
use tracing::info;

use super::audits::insert_audit_entries;
use super::{CenterRow, Database, StudyAuditRow, StudyRow};
use crate::audit::{diff_attributes, diff_centers, validate_reason};
use crate::config::AuditConfig;
use crate::error::{Collector, SyncError};
use crate::model::{StudyPhase, StudyStatus};

/// Create/update request body for a study.
///
/// Updates are full-record: optional attributes left out are cleared, except
/// `phase` and `status` which keep their current value, and `center_ids` which
/// leaves membership untouched when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudyInput {
    pub name: Option<String>,
    pub protocol_code: Option<String>,
    pub protocol_version: Option<String>,
    pub protocol_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub phase: Option<StudyPhase>,
    pub status: Option<StudyStatus>,
    pub target_inclusions: Option<i32>,
    pub therapeutic_area: Option<String>,
    pub sponsor_id: Option<i64>,
    pub center_ids: Option<Vec<i64>>,
}

impl StudyInput {
    fn validate(&self, creating: bool) -> Result<(), SyncError> {
        let mut errors = Collector::default();
        if self.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            errors.push("name", "is required");
        }
        if creating
            && self
                .protocol_code
                .as_deref()
                .map_or(true, |c| c.trim().is_empty())
        {
            errors.push("protocol_code", "is required");
        }
        if matches!(self.target_inclusions, Some(n) if n < 0) {
            errors.push("target_inclusions", "must not be negative");
        }
        errors.finish(())
    }

    fn name(&self) -> &str {
        self.name.as_deref().map(str::trim).unwrap_or_default()
    }
}

/// A study together with its center membership.
#[derive(Debug, Clone, Serialize)]
pub struct StudyDetail {
    #[serde(flatten)]
    pub study: StudyRow,
    pub centers: Vec<CenterRow>,
}

/// Result of an audited update.
#[derive(Debug, Clone, Serialize)]
pub struct StudyUpdateOutcome {
    pub study: StudyDetail,
    pub audits: Vec<StudyAuditRow>,
}

impl StudyRow {
    /// Scalar attributes as compared by the audit diff.
    fn audit_snapshot(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "protocol_code": self.protocol_code,
            "protocol_version": self.protocol_version,
            "protocol_date": self.protocol_date.map(|d| d.to_string()),
            "start_date": self.start_date.map(|d| d.to_string()),
            "phase": self.phase,
            "status": self.status,
            "target_inclusions": self.target_inclusions,
            "therapeutic_area": self.therapeutic_area,
            "sponsor_id": self.sponsor_id,
            "created_at": self.created_at.to_rfc3339(),
            "updated_at": self.updated_at.to_rfc3339(),
        })
    }
}

const STUDY_COLUMNS: &str = "id, name, protocol_code, protocol_version, protocol_date, start_date,
     phase, status, target_inclusions, therapeutic_area, sponsor_id, structure_revision,
     created_at, updated_at";

impl Database {
    /// Create a study and its center links. A duplicate protocol code is a conflict.
    pub async fn create_study(&self, input: &StudyInput) -> Result<StudyDetail, SyncError> {
        input.validate(true)?;
        let code = input.protocol_code.as_deref().unwrap_or_default().trim();

        let mut tx = self.pool.begin().await?;
        ensure_sponsor(&mut tx, input.sponsor_id).await?;
        let inserted = sqlx::query_as::<_, StudyRow>(&format!(
            "INSERT INTO studies (name, protocol_code, protocol_version, protocol_date, start_date,
                                  phase, status, target_inclusions, therapeutic_area, sponsor_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {}",
            STUDY_COLUMNS
        ))
        .bind(input.name())
        .bind(code)
        .bind(&input.protocol_version)
        .bind(input.protocol_date)
        .bind(input.start_date)
        .bind(input.phase.unwrap_or(StudyPhase::NotApplicable).as_str())
        .bind(input.status.unwrap_or(StudyStatus::Draft).as_str())
        .bind(input.target_inclusions)
        .bind(&input.therapeutic_area)
        .bind(input.sponsor_id)
        .fetch_one(&mut *tx)
        .await;
        let study = match inserted {
            Ok(study) => study,
            Err(e) => {
                let err = SyncError::from(e);
                if err.is_unique_violation() {
                    return Err(SyncError::Conflict(format!(
                        "protocol code {} already exists",
                        code
                    )));
                }
                return Err(err);
            }
        };
        if let Some(ids) = &input.center_ids {
            replace_centers(&mut tx, study.id, ids).await?;
        }
        let centers = centers_of(&mut tx, study.id).await?;
        tx.commit().await?;

        info!(protocol_code = code, study_id = study.id, "study created");
        Ok(StudyDetail { study, centers })
    }

    /// Look up a study by its protocol code.
    pub async fn get_study_by_code(&self, protocol_code: &str) -> Result<Option<StudyRow>> {
        let row = sqlx::query_as::<_, StudyRow>(&format!(
            "SELECT {} FROM studies WHERE protocol_code = $1",
            STUDY_COLUMNS
        ))
        .bind(protocol_code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// A study with its centers, or `None` if the protocol code is unknown.
    pub async fn get_study_detail(&self, protocol_code: &str) -> Result<Option<StudyDetail>> {
        let Some(study) = self.get_study_by_code(protocol_code).await? else {
            return Ok(None);
        };
        let mut conn = self.pool.acquire().await?;
        let centers = centers_of(&mut conn, study.id).await?;
        Ok(Some(StudyDetail { study, centers }))
    }

    /// Full-record study update with a mandatory reason.
    ///
    /// The reason is validated before anything is read or written; a missing or
    /// short reason therefore leaves no trace. The protocol code is immutable.
    pub async fn update_study(
        &self,
        protocol_code: &str,
        input: &StudyInput,
        reason: Option<&str>,
        user_id: i64,
        audit: &AuditConfig,
    ) -> Result<StudyUpdateOutcome, SyncError> {
        let reason = validate_reason(reason, audit.min_reason_len)?;
        input.validate(false)?;
        if let Some(code) = input.protocol_code.as_deref() {
            if code.trim() != protocol_code {
                return Err(SyncError::field("protocol_code", "cannot be changed"));
            }
        }

        let mut tx = self.pool.begin().await?;
        let old = sqlx::query_as::<_, StudyRow>(&format!(
            "SELECT {} FROM studies WHERE protocol_code = $1 FOR UPDATE",
            STUDY_COLUMNS
        ))
        .bind(protocol_code)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| SyncError::not_found("study", protocol_code))?;

        let user_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;
        if !user_exists {
            return Err(SyncError::not_found("user", user_id));
        }
        ensure_sponsor(&mut tx, input.sponsor_id).await?;

        let old_centers = centers_of(&mut tx, old.id).await?;
        if let Some(ids) = &input.center_ids {
            replace_centers(&mut tx, old.id, ids).await?;
        }

        let new = sqlx::query_as::<_, StudyRow>(&format!(
            "UPDATE studies
                SET name = $2, protocol_version = $3, protocol_date = $4, start_date = $5,
                    phase = COALESCE($6, phase), status = COALESCE($7, status),
                    target_inclusions = $8, therapeutic_area = $9, sponsor_id = $10,
                    updated_at = NOW()
              WHERE id = $1
              RETURNING {}",
            STUDY_COLUMNS
        ))
        .bind(old.id)
        .bind(input.name())
        .bind(&input.protocol_version)
        .bind(input.protocol_date)
        .bind(input.start_date)
        .bind(input.phase.map(|p| p.as_str()))
        .bind(input.status.map(|s| s.as_str()))
        .bind(input.target_inclusions)
        .bind(&input.therapeutic_area)
        .bind(input.sponsor_id)
        .fetch_one(&mut *tx)
        .await?;
        let new_centers = centers_of(&mut tx, old.id).await?;

        let mut entries = diff_attributes(
            &old.audit_snapshot(),
            &new.audit_snapshot(),
            &audit.excluded_fields,
        );
        let named = |centers: &[CenterRow]| -> Vec<(i64, String)> {
            centers.iter().map(|c| (c.id, c.name.clone())).collect()
        };
        entries.extend(diff_centers(&named(&old_centers), &named(&new_centers)));

        let audits = insert_audit_entries(&mut tx, old.id, user_id, reason, &entries).await?;
        tx.commit().await?;

        info!(
            protocol_code,
            user_id,
            changed = audits.len(),
            "study updated"
        );
        Ok(StudyUpdateOutcome {
            study: StudyDetail {
                study: new,
                centers: new_centers,
            },
            audits,
        })
    }

    /// Create a center; used by seeding and tests.
    pub async fn create_center(&self, code: &str, name: &str) -> Result<CenterRow> {
        let row = sqlx::query_as::<_, CenterRow>(
            "INSERT INTO centers (code, name) VALUES ($1, $2) RETURNING id, code, name",
        )
        .bind(code)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Create a user; used by seeding and tests.
    pub async fn create_user(&self, email: &str, name: &str) -> Result<i64> {
        let id = sqlx::query_scalar("INSERT INTO users (email, name) VALUES ($1, $2) RETURNING id")
            .bind(email)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }
}

async fn centers_of(conn: &mut PgConnection, study_id: i64) -> Result<Vec<CenterRow>, sqlx::Error> {
    sqlx::query_as::<_, CenterRow>(
        "SELECT c.id, c.code, c.name
         FROM study_centers sc JOIN centers c ON c.id = sc.center_id
         WHERE sc.study_id = $1
         ORDER BY c.name",
    )
    .bind(study_id)
    .fetch_all(&mut *conn)
    .await
}

/// An unknown sponsor is a validation error, like an unknown center.
async fn ensure_sponsor(conn: &mut PgConnection, sponsor_id: Option<i64>) -> Result<(), SyncError> {
    let Some(id) = sponsor_id else {
        return Ok(());
    };
    let known: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    if known {
        Ok(())
    } else {
        Err(SyncError::field("sponsor_id", format!("unknown sponsor id: {}", id)))
    }
}

/// Replace the center set of a study. Unknown center ids are a validation error.
async fn replace_centers(
    conn: &mut PgConnection,
    study_id: i64,
    center_ids: &[i64],
) -> Result<(), SyncError> {
    let mut ids = center_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    let known: Vec<i64> = sqlx::query_scalar("SELECT id FROM centers WHERE id = ANY($1)")
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;
    if known.len() != ids.len() {
        let unknown: Vec<String> = ids
            .iter()
            .filter(|id| !known.contains(id))
            .map(|id| id.to_string())
            .collect();
        return Err(SyncError::field(
            "center_ids",
            format!("unknown center ids: {}", unknown.join(", ")),
        ));
    }

    sqlx::query("DELETE FROM study_centers WHERE study_id = $1 AND NOT (center_id = ANY($2))")
        .bind(study_id)
        .bind(&ids)
        .execute(&mut *conn)
        .await?;
    sqlx::query(
        "INSERT INTO study_centers (study_id, center_id)
         SELECT $1, UNNEST($2::BIGINT[])
         ON CONFLICT DO NOTHING",
    )
    .bind(study_id)
    .bind(&ids)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row() -> StudyRow {
        StudyRow {
            id: 1,
            name: "ALPHA".into(),
            protocol_code: "ALPHA-01".into(),
            protocol_version: Some("1.0".into()),
            protocol_date: NaiveDate::from_ymd_opt(2026, 1, 15),
            start_date: None,
            phase: "phase_2".into(),
            status: "draft".into(),
            target_inclusions: Some(120),
            therapeutic_area: None,
            sponsor_id: None,
            structure_revision: 4,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn create_requires_name_and_protocol_code() {
        let err = StudyInput::default().validate(true).unwrap_err();
        match err {
            SyncError::Validation(errors) => {
                assert!(errors.contains_key("name"));
                assert!(errors.contains_key("protocol_code"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn update_does_not_require_protocol_code() {
        let input = StudyInput {
            name: Some("ALPHA".into()),
            ..Default::default()
        };
        assert!(input.validate(false).is_ok());
        let negative = StudyInput {
            target_inclusions: Some(-1),
            ..input
        };
        assert!(negative.validate(false).is_err());
    }

    #[test]
    fn snapshot_diff_ignores_revision_and_timestamps() {
        let old = row();
        let mut new = row();
        new.structure_revision = 9;
        new.updated_at = Utc::now() + chrono::Duration::seconds(5);
        new.protocol_version = Some("2.0".into());
        let excluded = AuditConfig::default().excluded_fields;
        assert!(diff_attributes(&old.audit_snapshot(), &new.audit_snapshot(), &excluded).is_empty());
    }

    #[test]
    fn snapshot_diff_reports_dates_as_text() {
        let old = row();
        let mut new = row();
        new.start_date = NaiveDate::from_ymd_opt(2026, 3, 1);
        let excluded = AuditConfig::default().excluded_fields;
        let entries = diff_attributes(&old.audit_snapshot(), &new.audit_snapshot(), &excluded);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field_name, "start_date");
        assert_eq!(entries[0].old_value, None);
        assert_eq!(entries[0].new_value.as_deref(), Some("2026-03-01"));
    }
}

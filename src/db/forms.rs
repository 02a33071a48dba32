//! Direct form and field CRUD.
//!
//! These bypass structure synchronization: a single form or field is added,
//! patched or removed in place. New siblings take a fractional order between
//! their neighbours (see [`crate::ordering`]) so no other row is rewritten,
//! unless the gap has collapsed and the section is renormalized first.
//!
//! Every mutation bumps the revision of the form it touches and the structure
//! revision of the owning study, with the study locked before the form.

use anyhow::Result;
use serde::Deserialize;
use sqlx::PgConnection;
use tracing::{debug, info};
use uuid::Uuid;

use super::structure::{bump_study_revision, lock_form};
use super::{Database, FieldRow, FormRow};
use crate::error::SyncError;
use crate::model::FormStatus;
use crate::ordering::{order_between, renormalized};
use crate::structure::FieldNode;

/// Body of `POST /studies/{protocol_code}/forms`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewForm {
    pub title: Option<String>,
    #[serde(default, alias = "isHidden")]
    pub is_hidden: bool,
}

/// Body of `PATCH /forms/{form_id}`. Absent keys are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormPatch {
    pub title: Option<String>,
    #[serde(alias = "isHidden")]
    pub is_hidden: Option<bool>,
    pub status: Option<FormStatus>,
    pub version: Option<i32>,
}

/// Where a new field goes among its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPlacement {
    After(Uuid),
    Before(Uuid),
    End,
}

const FORM_COLUMNS: &str =
    "id, study_id, title, sort_order, is_hidden, status, version, revision, created_at, updated_at";

const FIELD_COLUMNS: &str = "id, section_id, name, label, field_type, placeholder, help_text,
     help_image, is_required, sort_order, settings, created_at, updated_at";

fn required_title(title: Option<&str>) -> Result<&str, SyncError> {
    match title.map(str::trim) {
        Some(t) if !t.is_empty() => Ok(t),
        _ => Err(SyncError::field("title", "is required")),
    }
}

impl Database {
    /// Append a form after the study's last form.
    pub async fn create_form(&self, protocol_code: &str, form: &NewForm) -> Result<FormRow, SyncError> {
        let title = required_title(form.title.as_deref())?;
        let mut tx = self.pool.begin().await?;
        let study_id: i64 = sqlx::query_scalar("SELECT id FROM studies WHERE protocol_code = $1 FOR UPDATE")
            .bind(protocol_code)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| SyncError::not_found("study", protocol_code))?;
        let last: Option<f64> = sqlx::query_scalar("SELECT MAX(sort_order) FROM forms WHERE study_id = $1")
            .bind(study_id)
            .fetch_one(&mut *tx)
            .await?;
        let row = sqlx::query_as::<_, FormRow>(&format!(
            "INSERT INTO forms (id, study_id, title, sort_order, is_hidden)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {}",
            FORM_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(study_id)
        .bind(title)
        .bind(order_between(last, None).unwrap_or_default())
        .bind(form.is_hidden)
        .fetch_one(&mut *tx)
        .await?;
        bump_study_revision(&mut tx, study_id).await?;
        tx.commit().await?;
        info!(protocol_code, form_id = %row.id, "form created");
        Ok(row)
    }

    /// Patch a form's metadata. Every change bumps the form revision.
    pub async fn update_form_meta(&self, form_id: Uuid, patch: &FormPatch) -> Result<FormRow, SyncError> {
        let title = match patch.title.as_deref() {
            Some(t) => Some(required_title(Some(t))?),
            None => None,
        };
        if matches!(patch.version, Some(v) if v < 1) {
            return Err(SyncError::field("version", "must be at least 1"));
        }
        let mut tx = self.pool.begin().await?;
        let lock = lock_form(&mut tx, form_id).await?;
        let row = sqlx::query_as::<_, FormRow>(&format!(
            "UPDATE forms
                SET title = COALESCE($2, title),
                    is_hidden = COALESCE($3, is_hidden),
                    status = COALESCE($4, status),
                    version = COALESCE($5, version),
                    revision = revision + 1,
                    updated_at = NOW()
              WHERE id = $1
              RETURNING {}",
            FORM_COLUMNS
        ))
        .bind(form_id)
        .bind(title)
        .bind(patch.is_hidden)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.version)
        .fetch_one(&mut *tx)
        .await?;
        bump_study_revision(&mut tx, lock.study_id).await?;
        tx.commit().await?;
        Ok(row)
    }

    /// Delete a form with its sections and fields. Returns false if it did not exist.
    pub async fn delete_form(&self, form_id: Uuid) -> Result<bool, SyncError> {
        let mut tx = self.pool.begin().await?;
        let lock = match lock_form(&mut tx, form_id).await {
            Ok(lock) => lock,
            Err(SyncError::NotFound { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };
        sqlx::query("DELETE FROM forms WHERE id = $1")
            .bind(form_id)
            .execute(&mut *tx)
            .await?;
        bump_study_revision(&mut tx, lock.study_id).await?;
        tx.commit().await?;
        info!(form_id = %form_id, "form deleted");
        Ok(true)
    }

    /// Insert one field into a section at the requested placement.
    pub async fn create_field(
        &self,
        section_id: Uuid,
        field: &FieldNode,
        placement: FieldPlacement,
    ) -> Result<FieldRow, SyncError> {
        let mut tx = self.pool.begin().await?;
        let lock = lock_section(&mut tx, section_id).await?;

        let order = match placement_order(&mut tx, section_id, placement).await? {
            Some(order) => order,
            None => {
                renormalize(&mut tx, section_id).await?;
                placement_order(&mut tx, section_id, placement)
                    .await?
                    .ok_or_else(|| SyncError::Conflict("no room to place field".to_string()))?
            }
        };

        let id = field.identity.id().unwrap_or_else(Uuid::new_v4);
        let inserted = sqlx::query_as::<_, FieldRow>(&format!(
            "INSERT INTO form_fields
                (id, section_id, name, label, field_type, placeholder, help_text, help_image,
                 is_required, sort_order, settings)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING {}",
            FIELD_COLUMNS
        ))
        .bind(id)
        .bind(section_id)
        .bind(&field.name)
        .bind(&field.label)
        .bind(field.field_type.as_str())
        .bind(&field.placeholder)
        .bind(&field.help_text)
        .bind(&field.help_image)
        .bind(field.required)
        .bind(order)
        .bind(field.settings.to_document())
        .fetch_one(&mut *tx)
        .await;
        let row = match inserted {
            Ok(row) => row,
            Err(e) => return Err(unique_as_conflict(e, field)),
        };
        bump_revisions(&mut tx, lock).await?;

        // The name constraint is deferred, so a clash surfaces here.
        if let Err(e) = tx.commit().await {
            return Err(unique_as_conflict(e, field));
        }
        info!(section_id = %section_id, field_id = %row.id, name = %row.name, "field created");
        Ok(row)
    }

    /// Delete one field. Returns false if it did not exist.
    pub async fn delete_field(&self, field_id: Uuid) -> Result<bool, SyncError> {
        let mut tx = self.pool.begin().await?;
        let section_id: Option<Uuid> =
            sqlx::query_scalar("SELECT section_id FROM form_fields WHERE id = $1")
                .bind(field_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(section_id) = section_id else {
            return Ok(false);
        };
        let lock = lock_section(&mut tx, section_id).await?;
        let deleted = sqlx::query("DELETE FROM form_fields WHERE id = $1")
            .bind(field_id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Ok(false);
        }
        bump_revisions(&mut tx, lock).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Rewrite a section's field orders to `0..n`, keeping their relative order.
    pub async fn renormalize_section_fields(&self, section_id: Uuid) -> Result<Vec<FieldRow>, SyncError> {
        let mut tx = self.pool.begin().await?;
        let exists: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM form_sections WHERE id = $1 FOR UPDATE")
                .bind(section_id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(SyncError::not_found("section", section_id));
        }
        renormalize(&mut tx, section_id).await?;
        let rows = sqlx::query_as::<_, FieldRow>(&format!(
            "SELECT {} FROM form_fields WHERE section_id = $1 ORDER BY sort_order",
            FIELD_COLUMNS
        ))
        .bind(section_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rows)
    }
}

fn unique_as_conflict(e: sqlx::Error, field: &FieldNode) -> SyncError {
    let err = SyncError::from(e);
    if err.is_unique_violation() {
        SyncError::Conflict(format!(
            "a field named {} or with this id already exists in the section",
            field.name
        ))
    } else {
        err
    }
}

#[derive(Debug, Clone, Copy)]
struct SectionLock {
    form_id: Uuid,
    study_id: i64,
}

/// Lock study, form and section in that order.
async fn lock_section(conn: &mut PgConnection, section_id: Uuid) -> Result<SectionLock, SyncError> {
    let form_id: Option<Uuid> = sqlx::query_scalar("SELECT form_id FROM form_sections WHERE id = $1")
        .bind(section_id)
        .fetch_optional(&mut *conn)
        .await?;
    let form_id = form_id.ok_or_else(|| SyncError::not_found("section", section_id))?;
    let form = lock_form(conn, form_id).await?;
    let still_there: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM form_sections WHERE id = $1 AND form_id = $2 FOR UPDATE")
            .bind(section_id)
            .bind(form_id)
            .fetch_optional(&mut *conn)
            .await?;
    if still_there.is_none() {
        return Err(SyncError::not_found("section", section_id));
    }
    Ok(SectionLock {
        form_id,
        study_id: form.study_id,
    })
}

async fn bump_revisions(conn: &mut PgConnection, lock: SectionLock) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE forms SET revision = revision + 1, updated_at = NOW() WHERE id = $1")
        .bind(lock.form_id)
        .execute(&mut *conn)
        .await?;
    bump_study_revision(conn, lock.study_id).await?;
    Ok(())
}

/// Order for a new field, or `None` if the neighbours are too close together.
async fn placement_order(
    conn: &mut PgConnection,
    section_id: Uuid,
    placement: FieldPlacement,
) -> Result<Option<f64>, SyncError> {
    let (prev, next) = match placement {
        FieldPlacement::End => {
            let last: Option<f64> =
                sqlx::query_scalar("SELECT MAX(sort_order) FROM form_fields WHERE section_id = $1")
                    .bind(section_id)
                    .fetch_one(&mut *conn)
                    .await?;
            (last, None)
        }
        FieldPlacement::After(anchor) => {
            let at = anchor_order(conn, section_id, anchor).await?;
            let next: Option<f64> = sqlx::query_scalar(
                "SELECT MIN(sort_order) FROM form_fields WHERE section_id = $1 AND sort_order > $2",
            )
            .bind(section_id)
            .bind(at)
            .fetch_one(&mut *conn)
            .await?;
            (Some(at), next)
        }
        FieldPlacement::Before(anchor) => {
            let at = anchor_order(conn, section_id, anchor).await?;
            let prev: Option<f64> = sqlx::query_scalar(
                "SELECT MAX(sort_order) FROM form_fields WHERE section_id = $1 AND sort_order < $2",
            )
            .bind(section_id)
            .bind(at)
            .fetch_one(&mut *conn)
            .await?;
            (prev, Some(at))
        }
    };
    Ok(order_between(prev, next))
}

async fn anchor_order(conn: &mut PgConnection, section_id: Uuid, anchor: Uuid) -> Result<f64, SyncError> {
    let order: Option<f64> =
        sqlx::query_scalar("SELECT sort_order FROM form_fields WHERE id = $1 AND section_id = $2")
            .bind(anchor)
            .bind(section_id)
            .fetch_optional(&mut *conn)
            .await?;
    order.ok_or_else(|| SyncError::field("placement", format!("field {} is not in this section", anchor)))
}

async fn renormalize(conn: &mut PgConnection, section_id: Uuid) -> Result<(), sqlx::Error> {
    let ids: Vec<Uuid> = sqlx::query_scalar(
        "SELECT id FROM form_fields WHERE section_id = $1 ORDER BY sort_order, created_at",
    )
    .bind(section_id)
    .fetch_all(&mut *conn)
    .await?;
    let orders = renormalized(ids.len());
    sqlx::query(
        "UPDATE form_fields f SET sort_order = v.ord
           FROM UNNEST($1::UUID[], $2::FLOAT8[]) AS v(id, ord)
          WHERE f.id = v.id",
    )
    .bind(&ids)
    .bind(&orders)
    .execute(&mut *conn)
    .await?;
    debug!(section_id = %section_id, count = ids.len(), "renormalized field order");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_title_is_rejected() {
        assert!(required_title(None).is_err());
        assert!(required_title(Some("   ")).is_err());
        assert_eq!(required_title(Some(" Week 4 ")).unwrap(), "Week 4");
    }

    #[test]
    fn patch_accepts_camel_case_and_typed_status() {
        let patch: FormPatch =
            serde_json::from_value(json!({"isHidden": true, "status": "published"})).unwrap();
        assert_eq!(patch.is_hidden, Some(true));
        assert_eq!(patch.status, Some(FormStatus::Published));
        assert!(patch.title.is_none());
        assert!(serde_json::from_value::<FormPatch>(json!({"status": "live"})).is_err());
    }
}

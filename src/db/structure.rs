//! Structure synchronization.
//!
//! Reconciles a validated payload tree against the persisted
//! forms → sections → fields rows inside a single transaction:
//!
//! 1. Lock the root row (study or form) and check the optional revision token.
//!    Form-rooted calls lock the owning study first, the same order a study
//!    sync takes its locks in.
//! 2. Claim the persisted rows the payload names anywhere under the root. A
//!    claimed row may change parent within the root: it is re-parented by its
//!    upsert and never deleted by the parent it left.
//! 3. Per parent, plan with [`crate::differ::plan_children`] and upsert the
//!    incoming children in order, stamping `sort_order` from their position.
//!    Descend with the parent's resolved identifier, down to the leaf level the
//!    payload carries. Absent children are only collected at this stage.
//! 4. Delete the collected children, deepest level first (storage cascades to
//!    their descendants), so a moved row has already left a doomed parent.
//! 5. Bump the revisions of the root and of every form the call touched, then
//!    commit.
//!
//! Any error rolls the whole transaction back, including a deferred
//! uniqueness violation raised at commit time.

use std::collections::HashSet;

use serde::Serialize;
use sqlx::{PgConnection, Postgres, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use super::{Database, FieldRow, FormRow, FormView, SectionRow, SectionView, StudyStructure};
use crate::differ::{plan_children, ChildPlan, Identified, PlannedChild};
use crate::error::SyncError;
use crate::ordering::position_order;
use crate::structure::{
    FieldNode, FormTree, SectionNode, SectionOrder, StudyTree, VisitNode,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelCounts {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl LevelCounts {
    fn record(&mut self, inserted: bool) {
        if inserted {
            self.inserted += 1;
        } else {
            self.updated += 1;
        }
    }
}

/// What one synchronization call did, per level.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SyncSummary {
    pub forms: LevelCounts,
    pub sections: LevelCounts,
    pub fields: LevelCounts,
    /// Root revision after the call.
    pub revision: i64,
}

impl Database {
    /// Replace the whole visit/subsection structure of a study.
    pub async fn sync_study_structure(
        &self,
        protocol_code: &str,
        tree: &StudyTree,
    ) -> Result<SyncSummary, SyncError> {
        let mut tx = self.pool.begin().await?;
        let outcome = sync_study(&mut tx, protocol_code, tree).await;
        finish(tx, outcome, "study_structure", protocol_code).await
    }

    /// Replace one form's title, sections and fields.
    pub async fn sync_form(&self, form_id: Uuid, tree: &FormTree) -> Result<SyncSummary, SyncError> {
        let mut tx = self.pool.begin().await?;
        let outcome = sync_form(&mut tx, form_id, tree).await;
        finish(tx, outcome, "form", &form_id.to_string()).await
    }

    /// Reconcile a form's sections only; fields of surviving sections are kept.
    pub async fn reorder_sections(
        &self,
        form_id: Uuid,
        order: &SectionOrder,
    ) -> Result<SyncSummary, SyncError> {
        let mut tx = self.pool.begin().await?;
        let outcome = reorder(&mut tx, form_id, order).await;
        finish(tx, outcome, "section_order", &form_id.to_string()).await
    }

    /// Load the full ordered structure of a study.
    pub async fn get_study_structure(
        &self,
        protocol_code: &str,
    ) -> Result<Option<StudyStructure>, SyncError> {
        let mut conn = self.pool.acquire().await?;
        let study: Option<(i64, i64)> = sqlx::query_as(
            "SELECT id, structure_revision FROM studies WHERE protocol_code = $1",
        )
        .bind(protocol_code)
        .fetch_optional(&mut *conn)
        .await?;
        let Some((study_id, revision)) = study else {
            return Ok(None);
        };
        let forms = sqlx::query_as::<_, FormRow>(
            "SELECT id, study_id, title, sort_order, is_hidden, status, version, revision,
                    created_at, updated_at
             FROM forms WHERE study_id = $1 ORDER BY sort_order, created_at",
        )
        .bind(study_id)
        .fetch_all(&mut *conn)
        .await?;
        let visits = load_form_views(&mut conn, forms).await?;
        Ok(Some(StudyStructure {
            protocol_code: protocol_code.to_string(),
            revision,
            visits,
        }))
    }

    /// Load one form with its ordered sections and fields.
    pub async fn get_form_view(&self, form_id: Uuid) -> Result<Option<FormView>, SyncError> {
        let mut conn = self.pool.acquire().await?;
        let form = sqlx::query_as::<_, FormRow>(
            "SELECT id, study_id, title, sort_order, is_hidden, status, version, revision,
                    created_at, updated_at
             FROM forms WHERE id = $1",
        )
        .bind(form_id)
        .fetch_optional(&mut *conn)
        .await?;
        match form {
            Some(form) => Ok(load_form_views(&mut conn, vec![form]).await?.pop()),
            None => Ok(None),
        }
    }
}

/// Commit on success, roll back on failure, and log either way.
async fn finish(
    tx: Transaction<'static, Postgres>,
    outcome: Result<SyncSummary, SyncError>,
    operation: &'static str,
    key: &str,
) -> Result<SyncSummary, SyncError> {
    let summary = match outcome {
        Ok(summary) => summary,
        Err(e) => {
            if let Err(rb) = tx.rollback().await {
                warn!(operation, key, error = %rb, "rollback failed");
            }
            warn!(operation, key, kind = e.kind(), error = %e, "structure sync rolled back");
            return Err(e);
        }
    };
    if let Err(e) = tx.commit().await {
        warn!(operation, key, error = %e, "structure sync commit failed");
        return Err(e.into());
    }
    info!(
        operation,
        key,
        revision = summary.revision,
        forms = ?summary.forms,
        sections = ?summary.sections,
        fields = ?summary.fields,
        "structure synchronized"
    );
    Ok(summary)
}

fn check_revision(expected: Option<i64>, current: i64) -> Result<(), SyncError> {
    match expected {
        Some(rev) if rev != current => Err(SyncError::Conflict(format!(
            "stale revision: payload carries {}, current is {}",
            rev, current
        ))),
        _ => Ok(()),
    }
}

fn ensure_asserted<T>(
    plan: &ChildPlan<'_, T>,
    claimed: &HashSet<Uuid>,
    entity: &str,
) -> Result<(), SyncError> {
    match plan.missing_asserted.iter().find(|id| !claimed.contains(id)) {
        Some(id) => Err(SyncError::Conflict(format!(
            "{} {} is marked as existing but is not persisted under its parent",
            entity, id
        ))),
        None => Ok(()),
    }
}

fn foreign_owner(entity: &str, id: Uuid) -> SyncError {
    SyncError::Conflict(format!("{} {} belongs to another parent", entity, id))
}

/// Nodes of one sibling list that survive deduplication, in order.
fn survivors<T: Identified>(nodes: &[T]) -> Vec<&T> {
    plan_children(nodes, &[]).upserts.into_iter().map(|c| c.node).collect()
}

/// State carried across the levels of one synchronization call.
#[derive(Debug, Default)]
struct Pass {
    summary: SyncSummary,
    /// Persisted rows under the root that the payload names somewhere.
    claimed_sections: HashSet<Uuid>,
    claimed_fields: HashSet<Uuid>,
    doomed_forms: Vec<Uuid>,
    doomed_sections: Vec<Uuid>,
    doomed_fields: Vec<Uuid>,
}

impl Pass {
    fn section_movable(&self, id: Option<Uuid>) -> bool {
        id.is_some_and(|id| self.claimed_sections.contains(&id))
    }

    fn field_movable(&self, id: Option<Uuid>) -> bool {
        id.is_some_and(|id| self.claimed_fields.contains(&id))
    }

    async fn apply_deletes(&mut self, conn: &mut PgConnection) -> Result<(), SyncError> {
        self.summary.fields.deleted += delete_ids(conn, "form_fields", &self.doomed_fields).await?;
        self.summary.sections.deleted +=
            delete_ids(conn, "form_sections", &self.doomed_sections).await?;
        self.summary.forms.deleted += delete_ids(conn, "forms", &self.doomed_forms).await?;
        Ok(())
    }
}

fn unclaimed(deletes: &[Uuid], claimed: &HashSet<Uuid>) -> Vec<Uuid> {
    deletes.iter().filter(|id| !claimed.contains(id)).copied().collect()
}

async fn claim_in_study(
    conn: &mut PgConnection,
    study_id: i64,
    tree: &StudyTree,
    pass: &mut Pass,
) -> Result<(), SyncError> {
    let mut sections = Vec::new();
    let mut fields = Vec::new();
    for visit in survivors(&tree.visits) {
        for section in survivors(&visit.subsections) {
            sections.extend(section.identity.id());
            if let Some(list) = &section.fields {
                fields.extend(survivors(list).into_iter().filter_map(|f| f.identity.id()));
            }
        }
    }
    if !sections.is_empty() {
        let rows = sqlx::query_scalar::<_, Uuid>(
            "SELECT s.id FROM form_sections s JOIN forms f ON f.id = s.form_id
              WHERE f.study_id = $1 AND s.id = ANY($2)",
        )
        .bind(study_id)
        .bind(&sections)
        .fetch_all(&mut *conn)
        .await?;
        pass.claimed_sections = rows.into_iter().collect();
    }
    if !fields.is_empty() {
        let rows = sqlx::query_scalar::<_, Uuid>(
            "SELECT fl.id FROM form_fields fl
               JOIN form_sections s ON s.id = fl.section_id
               JOIN forms f ON f.id = s.form_id
              WHERE f.study_id = $1 AND fl.id = ANY($2)",
        )
        .bind(study_id)
        .bind(&fields)
        .fetch_all(&mut *conn)
        .await?;
        pass.claimed_fields = rows.into_iter().collect();
    }
    Ok(())
}

async fn claim_in_form(
    conn: &mut PgConnection,
    form_id: Uuid,
    sections: &[SectionNode],
    pass: &mut Pass,
) -> Result<(), SyncError> {
    let fields: Vec<Uuid> = survivors(sections)
        .into_iter()
        .filter_map(|s| s.fields.as_deref())
        .flat_map(|list| survivors(list).into_iter().filter_map(|f| f.identity.id()))
        .collect();
    if fields.is_empty() {
        return Ok(());
    }
    let rows = sqlx::query_scalar::<_, Uuid>(
        "SELECT fl.id FROM form_fields fl JOIN form_sections s ON s.id = fl.section_id
          WHERE s.form_id = $1 AND fl.id = ANY($2)",
    )
    .bind(form_id)
    .bind(&fields)
    .fetch_all(&mut *conn)
    .await?;
    pass.claimed_fields = rows.into_iter().collect();
    Ok(())
}

async fn sync_study(
    conn: &mut PgConnection,
    protocol_code: &str,
    tree: &StudyTree,
) -> Result<SyncSummary, SyncError> {
    let study: Option<(i64, i64)> = sqlx::query_as(
        "SELECT id, structure_revision FROM studies WHERE protocol_code = $1 FOR UPDATE",
    )
    .bind(protocol_code)
    .fetch_optional(&mut *conn)
    .await?;
    let (study_id, current) = study.ok_or_else(|| SyncError::not_found("study", protocol_code))?;
    check_revision(tree.revision, current)?;

    let mut pass = Pass::default();
    claim_in_study(conn, study_id, tree, &mut pass).await?;
    reconcile_forms(conn, study_id, &tree.visits, &mut pass).await?;
    pass.apply_deletes(conn).await?;
    pass.summary.revision = bump_study_revision(conn, study_id).await?;
    Ok(pass.summary)
}

/// A form and its study, both locked for the rest of the transaction.
#[derive(Debug, Clone, Copy)]
pub(super) struct FormLock {
    pub study_id: i64,
    pub revision: i64,
}

/// Lock the owning study, then the form. `NotFound` if the form does not exist.
pub(super) async fn lock_form(conn: &mut PgConnection, form_id: Uuid) -> Result<FormLock, SyncError> {
    let study_id: Option<i64> = sqlx::query_scalar("SELECT study_id FROM forms WHERE id = $1")
        .bind(form_id)
        .fetch_optional(&mut *conn)
        .await?;
    let study_id = study_id.ok_or_else(|| SyncError::not_found("form", form_id))?;
    sqlx::query("SELECT id FROM studies WHERE id = $1 FOR UPDATE")
        .bind(study_id)
        .execute(&mut *conn)
        .await?;
    let revision: Option<i64> =
        sqlx::query_scalar("SELECT revision FROM forms WHERE id = $1 FOR UPDATE")
            .bind(form_id)
            .fetch_optional(&mut *conn)
            .await?;
    let revision = revision.ok_or_else(|| SyncError::not_found("form", form_id))?;
    Ok(FormLock { study_id, revision })
}

/// Every structural change under a study invalidates its structure token.
pub(super) async fn bump_study_revision(
    conn: &mut PgConnection,
    study_id: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "UPDATE studies SET structure_revision = structure_revision + 1 WHERE id = $1
         RETURNING structure_revision",
    )
    .bind(study_id)
    .fetch_one(&mut *conn)
    .await
}

async fn sync_form(
    conn: &mut PgConnection,
    form_id: Uuid,
    tree: &FormTree,
) -> Result<SyncSummary, SyncError> {
    let lock = lock_form(conn, form_id).await?;
    check_revision(tree.revision, lock.revision)?;

    let mut pass = Pass::default();
    claim_in_form(conn, form_id, &tree.sections, &mut pass).await?;
    pass.summary.revision = sqlx::query_scalar(
        "UPDATE forms SET title = $2, revision = revision + 1, updated_at = NOW()
         WHERE id = $1 RETURNING revision",
    )
    .bind(form_id)
    .bind(&tree.title)
    .fetch_one(&mut *conn)
    .await?;
    pass.summary.forms.updated = 1;
    reconcile_sections(conn, form_id, &tree.sections, &mut pass).await?;
    pass.apply_deletes(conn).await?;
    bump_study_revision(conn, lock.study_id).await?;
    Ok(pass.summary)
}

async fn reorder(
    conn: &mut PgConnection,
    form_id: Uuid,
    order: &SectionOrder,
) -> Result<SyncSummary, SyncError> {
    let lock = lock_form(conn, form_id).await?;
    check_revision(order.revision, lock.revision)?;

    let mut pass = Pass::default();
    reconcile_sections(conn, form_id, &order.sections, &mut pass).await?;
    pass.apply_deletes(conn).await?;
    pass.summary.revision = sqlx::query_scalar(
        "UPDATE forms SET revision = revision + 1, updated_at = NOW() WHERE id = $1
         RETURNING revision",
    )
    .bind(form_id)
    .fetch_one(&mut *conn)
    .await?;
    bump_study_revision(conn, lock.study_id).await?;
    Ok(pass.summary)
}

// ── Per-level reconciliation ────────────────────────────────────

async fn delete_ids(
    conn: &mut PgConnection,
    table: &'static str,
    ids: &[Uuid],
) -> Result<usize, SyncError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ANY($1)", table))
        .bind(ids)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() as usize)
}

async fn reconcile_forms(
    conn: &mut PgConnection,
    study_id: i64,
    visits: &[VisitNode],
    pass: &mut Pass,
) -> Result<(), SyncError> {
    let persisted: Vec<Uuid> = sqlx::query_scalar(
        "SELECT id FROM forms WHERE study_id = $1 ORDER BY sort_order, created_at",
    )
    .bind(study_id)
    .fetch_all(&mut *conn)
    .await?;
    let plan = plan_children(visits, &persisted);
    ensure_asserted(&plan, &HashSet::new(), "form")?;

    pass.doomed_forms.extend_from_slice(&plan.deletes);
    for child in &plan.upserts {
        let (form_id, inserted) = upsert_form(conn, study_id, child).await?;
        pass.summary.forms.record(inserted);
        reconcile_sections(conn, form_id, &child.node.subsections, pass).await?;
    }
    Ok(())
}

/// Updating an existing form bumps its revision: its visit-level attributes
/// or its sections are being rewritten from the study side.
async fn upsert_form(
    conn: &mut PgConnection,
    study_id: i64,
    child: &PlannedChild<'_, VisitNode>,
) -> Result<(Uuid, bool), SyncError> {
    let id = child.id.unwrap_or_else(Uuid::new_v4);
    let row: Option<(Uuid, bool)> = sqlx::query_as(
        "INSERT INTO forms (id, study_id, title, sort_order, is_hidden)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (id) DO UPDATE
            SET title = EXCLUDED.title,
                sort_order = EXCLUDED.sort_order,
                is_hidden = EXCLUDED.is_hidden,
                revision = forms.revision + 1,
                updated_at = CASE
                    WHEN (forms.title, forms.sort_order, forms.is_hidden)
                         IS DISTINCT FROM (EXCLUDED.title, EXCLUDED.sort_order, EXCLUDED.is_hidden)
                    THEN NOW() ELSE forms.updated_at END
            WHERE forms.study_id = EXCLUDED.study_id
         RETURNING id, (xmax = 0) AS inserted",
    )
    .bind(id)
    .bind(study_id)
    .bind(&child.node.title)
    .bind(position_order(child.position))
    .bind(child.node.hidden)
    .fetch_optional(&mut *conn)
    .await?;
    row.ok_or_else(|| foreign_owner("form", id))
}

async fn reconcile_sections(
    conn: &mut PgConnection,
    form_id: Uuid,
    sections: &[SectionNode],
    pass: &mut Pass,
) -> Result<(), SyncError> {
    let persisted: Vec<Uuid> = sqlx::query_scalar(
        "SELECT id FROM form_sections WHERE form_id = $1 ORDER BY sort_order, created_at",
    )
    .bind(form_id)
    .fetch_all(&mut *conn)
    .await?;
    let plan = plan_children(sections, &persisted);
    ensure_asserted(&plan, &pass.claimed_sections, "section")?;

    let doomed = unclaimed(&plan.deletes, &pass.claimed_sections);
    pass.doomed_sections.extend(doomed);
    for child in &plan.upserts {
        let movable = pass.section_movable(child.id);
        let (section_id, inserted) = upsert_section(conn, form_id, child, movable).await?;
        pass.summary.sections.record(inserted);
        if let Some(fields) = &child.node.fields {
            reconcile_fields(conn, section_id, fields, pass).await?;
        }
    }
    Ok(())
}

/// `movable` lets an existing row under another parent of the same root be
/// re-parented here; otherwise such a row is a conflict.
async fn upsert_section(
    conn: &mut PgConnection,
    form_id: Uuid,
    child: &PlannedChild<'_, SectionNode>,
    movable: bool,
) -> Result<(Uuid, bool), SyncError> {
    let id = child.id.unwrap_or_else(Uuid::new_v4);
    let row: Option<(Uuid, bool)> = sqlx::query_as(
        "INSERT INTO form_sections (id, form_id, title, sort_order, is_hidden)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (id) DO UPDATE
            SET form_id = EXCLUDED.form_id,
                title = EXCLUDED.title,
                sort_order = EXCLUDED.sort_order,
                is_hidden = EXCLUDED.is_hidden,
                updated_at = CASE
                    WHEN (form_sections.form_id, form_sections.title,
                          form_sections.sort_order, form_sections.is_hidden)
                         IS DISTINCT FROM
                         (EXCLUDED.form_id, EXCLUDED.title, EXCLUDED.sort_order, EXCLUDED.is_hidden)
                    THEN NOW() ELSE form_sections.updated_at END
            WHERE form_sections.form_id = EXCLUDED.form_id OR $6::BOOLEAN
         RETURNING id, (xmax = 0) AS inserted",
    )
    .bind(id)
    .bind(form_id)
    .bind(&child.node.title)
    .bind(position_order(child.position))
    .bind(child.node.hidden)
    .bind(movable)
    .fetch_optional(&mut *conn)
    .await?;
    row.ok_or_else(|| foreign_owner("section", id))
}

async fn reconcile_fields(
    conn: &mut PgConnection,
    section_id: Uuid,
    fields: &[FieldNode],
    pass: &mut Pass,
) -> Result<(), SyncError> {
    let persisted: Vec<Uuid> = sqlx::query_scalar(
        "SELECT id FROM form_fields WHERE section_id = $1 ORDER BY sort_order, created_at",
    )
    .bind(section_id)
    .fetch_all(&mut *conn)
    .await?;
    let plan = plan_children(fields, &persisted);
    ensure_asserted(&plan, &pass.claimed_fields, "field")?;

    let doomed = unclaimed(&plan.deletes, &pass.claimed_fields);
    pass.doomed_fields.extend(doomed);
    for child in &plan.upserts {
        let movable = pass.field_movable(child.id);
        let (_, inserted) = upsert_field(conn, section_id, child, movable).await?;
        pass.summary.fields.record(inserted);
    }
    Ok(())
}

async fn upsert_field(
    conn: &mut PgConnection,
    section_id: Uuid,
    child: &PlannedChild<'_, FieldNode>,
    movable: bool,
) -> Result<(Uuid, bool), SyncError> {
    let id = child.id.unwrap_or_else(Uuid::new_v4);
    let field = child.node;
    let row: Option<(Uuid, bool)> = sqlx::query_as(
        "INSERT INTO form_fields
            (id, section_id, name, label, field_type, placeholder, help_text, help_image,
             is_required, sort_order, settings)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         ON CONFLICT (id) DO UPDATE
            SET section_id = EXCLUDED.section_id,
                name = EXCLUDED.name,
                label = EXCLUDED.label,
                field_type = EXCLUDED.field_type,
                placeholder = EXCLUDED.placeholder,
                help_text = EXCLUDED.help_text,
                help_image = EXCLUDED.help_image,
                is_required = EXCLUDED.is_required,
                sort_order = EXCLUDED.sort_order,
                settings = EXCLUDED.settings,
                updated_at = CASE
                    WHEN (form_fields.section_id, form_fields.name, form_fields.label,
                          form_fields.field_type, form_fields.placeholder, form_fields.help_text,
                          form_fields.help_image, form_fields.is_required, form_fields.sort_order,
                          form_fields.settings)
                         IS DISTINCT FROM
                         (EXCLUDED.section_id, EXCLUDED.name, EXCLUDED.label,
                          EXCLUDED.field_type, EXCLUDED.placeholder, EXCLUDED.help_text,
                          EXCLUDED.help_image, EXCLUDED.is_required, EXCLUDED.sort_order,
                          EXCLUDED.settings)
                    THEN NOW() ELSE form_fields.updated_at END
            WHERE form_fields.section_id = EXCLUDED.section_id OR $12::BOOLEAN
         RETURNING id, (xmax = 0) AS inserted",
    )
    .bind(id)
    .bind(section_id)
    .bind(&field.name)
    .bind(&field.label)
    .bind(field.field_type.as_str())
    .bind(&field.placeholder)
    .bind(&field.help_text)
    .bind(&field.help_image)
    .bind(field.required)
    .bind(position_order(child.position))
    .bind(field.settings.to_document())
    .bind(movable)
    .fetch_optional(&mut *conn)
    .await?;
    row.ok_or_else(|| foreign_owner("field", id))
}

// ── Tree loading ────────────────────────────────────────────────

async fn load_form_views(
    conn: &mut PgConnection,
    forms: Vec<FormRow>,
) -> Result<Vec<FormView>, SyncError> {
    let form_ids: Vec<Uuid> = forms.iter().map(|f| f.id).collect();
    let sections = sqlx::query_as::<_, SectionRow>(
        "SELECT id, form_id, title, sort_order, is_hidden, created_at, updated_at
         FROM form_sections WHERE form_id = ANY($1) ORDER BY sort_order, created_at",
    )
    .bind(&form_ids)
    .fetch_all(&mut *conn)
    .await?;
    let section_ids: Vec<Uuid> = sections.iter().map(|s| s.id).collect();
    let fields = sqlx::query_as::<_, FieldRow>(
        "SELECT id, section_id, name, label, field_type, placeholder, help_text, help_image,
                is_required, sort_order, settings, created_at, updated_at
         FROM form_fields WHERE section_id = ANY($1) ORDER BY sort_order, created_at",
    )
    .bind(&section_ids)
    .fetch_all(&mut *conn)
    .await?;
    Ok(assemble(forms, sections, fields))
}

/// Group already-ordered rows into a tree, keeping row order within each parent.
fn assemble(forms: Vec<FormRow>, sections: Vec<SectionRow>, fields: Vec<FieldRow>) -> Vec<FormView> {
    use std::collections::HashMap;

    let mut fields_by_section: HashMap<Uuid, Vec<FieldRow>> = HashMap::new();
    for field in fields {
        fields_by_section.entry(field.section_id).or_default().push(field);
    }
    let mut sections_by_form: HashMap<Uuid, Vec<SectionView>> = HashMap::new();
    for section in sections {
        let fields = fields_by_section.remove(&section.id).unwrap_or_default();
        sections_by_form
            .entry(section.form_id)
            .or_default()
            .push(SectionView { section, fields });
    }
    forms
        .into_iter()
        .map(|form| {
            let sections = sections_by_form.remove(&form.id).unwrap_or_default();
            FormView { form, sections }
        })
        .collect()
}

//! # Database: PostgreSQL Storage Layer
//!
//! Async storage operations for studies and their CRF structure via
//! `sqlx::PgPool`.
//!
//! ## Schema
//!
//! - `studies`: protocol metadata, addressed externally by `protocol_code`
//! - `study_centers`: many-to-many link to `centers`
//! - `study_audits`: append-only change log for study edits
//! - `forms` → `form_sections` → `form_fields`: the CRF tree, UUID keyed,
//!   each level `ON DELETE CASCADE` from its parent
//!
//! ## Module Structure
//!
//! - [`studies`]: Study create/read/update with audit diffing
//! - [`structure`]: Transactional structure synchronization and tree loading
//! - [`forms`]: Direct form/field CRUD with fractional ordering
//! - [`audits`]: Audit row insertion and listing

mod audits;
mod forms;
mod structure;
mod studies;

pub use forms::{FieldPlacement, FormPatch, NewForm};
pub use structure::{LevelCounts, SyncSummary};
pub use studies::{StudyDetail, StudyInput, StudyUpdateOutcome};

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use uuid::Uuid;

/// Schema files applied in order by [`Database::migrate`].
const MIGRATIONS: &[(&str, &str)] = &[
    ("001_studies.sql", include_str!("../../migrations/001_studies.sql")),
    (
        "002_crf_structure.sql",
        include_str!("../../migrations/002_crf_structure.sql"),
    ),
];

// ── Study types ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StudyRow {
    pub id: i64,
    pub name: String,
    pub protocol_code: String,
    pub protocol_version: Option<String>,
    pub protocol_date: Option<chrono::NaiveDate>,
    pub start_date: Option<chrono::NaiveDate>,
    pub phase: String,
    pub status: String,
    pub target_inclusions: Option<i32>,
    pub therapeutic_area: Option<String>,
    pub sponsor_id: Option<i64>,
    pub structure_revision: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CenterRow {
    pub id: i64,
    pub code: String,
    pub name: String,
}

/// One immutable audit record.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StudyAuditRow {
    pub id: i64,
    pub study_id: i64,
    pub user_id: i64,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub reason: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// ── CRF structure types ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FormRow {
    pub id: Uuid,
    pub study_id: i64,
    pub title: String,
    pub sort_order: f64,
    pub is_hidden: bool,
    pub status: String,
    pub version: i32,
    pub revision: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SectionRow {
    pub id: Uuid,
    pub form_id: Uuid,
    pub title: String,
    pub sort_order: f64,
    pub is_hidden: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FieldRow {
    pub id: Uuid,
    pub section_id: Uuid,
    pub name: String,
    pub label: String,
    pub field_type: String,
    pub placeholder: Option<String>,
    pub help_text: Option<String>,
    pub help_image: Option<String>,
    pub is_required: bool,
    pub sort_order: f64,
    pub settings: Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionView {
    #[serde(flatten)]
    pub section: SectionRow,
    pub fields: Vec<FieldRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormView {
    #[serde(flatten)]
    pub form: FormRow,
    pub sections: Vec<SectionView>,
}

/// Full persisted structure of a study, ordered at every level.
#[derive(Debug, Clone, Serialize)]
pub struct StudyStructure {
    pub protocol_code: String,
    pub revision: i64,
    pub visits: Vec<FormView>,
}

// ── Database struct and connection ──────────────────────────────

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL using the provided database URL.
    ///
    /// Parses the URL manually so percent-encoded credentials survive intact.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let url = url::Url::parse(database_url)?;
        let username = urlencoding::decode(url.username())?.into_owned();
        let password = url
            .password()
            .map(|p| urlencoding::decode(p).map(|s| s.into_owned()))
            .transpose()?;
        let mut opts = PgConnectOptions::new()
            .host(url.host_str().unwrap_or("localhost"))
            .port(url.port().unwrap_or(5432))
            .database(url.path().trim_start_matches('/'))
            .username(&username);
        if let Some(ref pw) = password {
            opts = opts.password(pw);
        }
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;
        Ok(Database { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Database { pool }
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check: execute `SELECT 1` to verify database connectivity.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> Result<()> {
        for (name, sql) in MIGRATIONS {
            sqlx::raw_sql(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| anyhow::anyhow!("migration {} failed: {}", name, e))?;
            tracing::debug!(migration = name, "applied migration");
        }
        Ok(())
    }
}

//! Shared test helpers for integration tests.

#![allow(dead_code)]

use ecrf::config::AppConfig;
use ecrf::db::{Database, StudyInput};

/// Returns the test database URL from the `TEST_DATABASE_URL` environment variable.
/// Panics if the variable is not set.
pub fn test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set for integration tests")
}

/// Returns true if the test database URL is configured.
pub fn has_test_db() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

/// One-time schema initialization.
static SCHEMA_INIT: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

/// Ensure the test database schema is set up (runs migrations once per test binary).
pub async fn ensure_schema() {
    SCHEMA_INIT
        .get_or_init(|| async {
            let pool = sqlx::PgPool::connect(&test_db_url()).await.unwrap();
            Database::from_pool(pool).migrate().await.unwrap();
        })
        .await;
}

/// Connect to the test database (also ensures schema is set up).
pub async fn setup_test_db() -> Database {
    ensure_schema().await;
    let db = Database::connect(&test_db_url(), 5)
        .await
        .expect("Failed to connect to test database");
    truncate_all_tables(db.pool()).await;
    db
}

/// Build an Axum test app router connected to the test database.
pub async fn build_test_app() -> (axum::Router, Database) {
    build_test_app_with(AppConfig::default()).await
}

pub async fn build_test_app_with(config: AppConfig) -> (axum::Router, Database) {
    let db = setup_test_db().await;
    let state = ecrf::dashboard::AppState::new(db.clone(), config);
    (ecrf::dashboard::build_router(state), db)
}

/// Truncate all tables to ensure test isolation.
pub async fn truncate_all_tables(pool: &sqlx::PgPool) {
    sqlx::raw_sql(
        "TRUNCATE TABLE study_audits, form_fields, form_sections, forms,
                       study_centers, studies, centers, users
         RESTART IDENTITY CASCADE",
    )
    .execute(pool)
    .await
    .unwrap();
}

/// Seed a study with the given protocol code and return its id.
pub async fn seed_study(db: &Database, protocol_code: &str) -> i64 {
    let input = StudyInput {
        name: Some(format!("Study {}", protocol_code)),
        protocol_code: Some(protocol_code.to_string()),
        ..Default::default()
    };
    db.create_study(&input).await.unwrap().study.id
}

pub async fn seed_user(db: &Database) -> i64 {
    db.create_user("investigator@example.org", "Investigator")
        .await
        .unwrap()
}

pub async fn count(db: &Database, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(db.pool())
        .await
        .unwrap()
}

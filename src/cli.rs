//! # CLI Execution Functions
//!
//! Execution logic for each subcommand, kept out of `main.rs` so the entry
//! point stays a thin dispatcher.

use anyhow::Result;
use ecrf::config::AppConfig;
use ecrf::db::{Database, StudyStructure};
use ecrf::structure::{validate_study_structure, StructurePayload};
use ecrf::{dashboard, normalize};
use serde_json::{json, Value};
use std::path::Path;
use tracing::info;

use super::Cli;

fn database_url(cli: &Cli) -> Result<&str> {
    cli.database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required (set via --database-url or env)"))
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    AppConfig::load(cli.config.as_deref())
}

async fn connect(cli: &Cli, config: &AppConfig) -> Result<Database> {
    Database::connect(database_url(cli)?, config.database.max_connections).await
}

pub fn run_normalize(label: &str) -> Result<()> {
    let name = normalize::machine_name(label);
    if name.is_empty() {
        anyhow::bail!("label is blank");
    }
    println!("{}", name);
    Ok(())
}

pub fn run_serve(cli: &Cli, port: Option<u16>) -> Result<()> {
    let mut config = load_config(cli)?;
    if let Some(port) = port {
        config.server.port = port;
    }
    let url = database_url(cli)?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(dashboard::run(url, config))
}

pub fn run_migrate(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let database = connect(cli, &config).await?;
        database.migrate().await?;
        info!("schema is up to date");
        Ok::<_, anyhow::Error>(())
    })
}

pub fn run_export(cli: &Cli, protocol_code: &str) -> Result<()> {
    let config = load_config(cli)?;
    let rt = tokio::runtime::Runtime::new()?;
    let structure = rt.block_on(async {
        let database = connect(cli, &config).await?;
        database.get_study_structure(protocol_code).await.map_err(anyhow::Error::from)
    })?;
    let structure =
        structure.ok_or_else(|| anyhow::anyhow!("study not found: {}", protocol_code))?;
    println!("{}", serde_json::to_string_pretty(&structure_payload(&structure))?);
    Ok(())
}

pub fn run_import(cli: &Cli, protocol_code: &str, file: &Path) -> Result<()> {
    let config = load_config(cli)?;
    let content = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("reading {}: {}", file.display(), e))?;
    let payload: StructurePayload = serde_json::from_str(&content)?;
    let tree = validate_study_structure(&payload, config.sync.require_revision)?;

    let rt = tokio::runtime::Runtime::new()?;
    let summary = rt.block_on(async {
        let database = connect(cli, &config).await?;
        database
            .sync_study_structure(protocol_code, &tree)
            .await
            .map_err(anyhow::Error::from)
    })?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Persisted structure rendered in the shape the structure endpoint accepts,
/// so an export can be edited and imported back. Fields are included for
/// reference; a study structure import leaves them untouched.
fn structure_payload(structure: &StudyStructure) -> Value {
    let visits: Vec<Value> = structure
        .visits
        .iter()
        .map(|visit| {
            let subsections: Vec<Value> = visit
                .sections
                .iter()
                .map(|section| {
                    let fields: Vec<Value> = section
                        .fields
                        .iter()
                        .map(|f| {
                            json!({
                                "id": f.id,
                                "name": f.name,
                                "label": f.label,
                                "field_type": f.field_type,
                                "is_required": f.is_required,
                                "settings": f.settings,
                            })
                        })
                        .collect();
                    json!({
                        "id": section.section.id,
                        "title": section.section.title,
                        "isHidden": section.section.is_hidden,
                        "fields": fields,
                    })
                })
                .collect();
            json!({
                "id": visit.form.id,
                "title": visit.form.title,
                "isHidden": visit.form.is_hidden,
                "subsections": subsections,
            })
        })
        .collect();
    json!({
        "revision": structure.revision,
        "visits": visits,
    })
}

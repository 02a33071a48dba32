//! # Main: CLI Entry Point
//!
//! Routes subcommands to the HTTP server, schema migration, and the structure
//! import/export tools.
//!
//! ## Global Options
//!
//! - `--database-url` / `DATABASE_URL`: PostgreSQL connection.
//! - `--config` / `ECRF_CONFIG`: optional TOML configuration file.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ecrf", about = "Clinical-trial CRF builder backend")]
struct Cli {
    /// PostgreSQL connection URL (or set DATABASE_URL env var)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Path to a TOML configuration file
    #[arg(long, env = "ECRF_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server (applies migrations first)
    Serve {
        /// Listen port, overrides `[server] port`
        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },
    /// Apply the database schema
    Migrate,
    /// Print the machine name derived from a field label
    Normalize {
        /// Human-readable field label
        label: String,
    },
    /// Print a study's CRF structure as a JSON structure payload
    ExportStructure {
        #[arg(long)]
        protocol_code: String,
    },
    /// Replace a study's CRF structure from a JSON structure payload file
    ImportStructure {
        #[arg(long)]
        protocol_code: String,
        /// Payload file (`{"visits": [...]}`)
        #[arg(long)]
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // LOG_FORMAT=json for log shippers, human-readable otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    match &cli.command {
        Commands::Normalize { label } => cli::run_normalize(label),
        Commands::Serve { port } => cli::run_serve(&cli, *port),
        Commands::Migrate => cli::run_migrate(&cli),
        Commands::ExportStructure { protocol_code } => cli::run_export(&cli, protocol_code),
        Commands::ImportStructure {
            protocol_code,
            file,
        } => cli::run_import(&cli, protocol_code, file),
    }
}

//! TOML application configuration.
//!
//! Every section is optional; missing keys fall back to defaults. The file is
//! located via `--config` / `ECRF_CONFIG`, and `--port` on the command line
//! overrides `[server] port`.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::audit::DEFAULT_EXCLUDED_FIELDS;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub max_body_bytes: usize,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 7070,
            max_body_bytes: 2 * 1024 * 1024,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig { max_connections: 5 }
    }
}

/// Structure synchronization policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Reject structural payloads that carry no `revision` token.
    pub require_revision: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub min_reason_len: usize,
    pub excluded_fields: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        AuditConfig {
            min_reason_len: 5,
            excluded_fields: DEFAULT_EXCLUDED_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AppConfig {
    pub fn parse(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {}", path.display(), e))?;
        Self::parse(&content)
    }

    /// Load from `path` if given, otherwise use defaults.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(AppConfig::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be at least 1");
        }
        if self.server.request_timeout_secs == 0 {
            anyhow::bail!("server.request_timeout_secs must be at least 1");
        }
        if self.audit.min_reason_len == 0 {
            anyhow::bail!("audit.min_reason_len must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.server.port, 7070);
        assert_eq!(config.database.max_connections, 5);
        assert!(!config.sync.require_revision);
        assert_eq!(config.audit.min_reason_len, 5);
        assert!(config
            .audit
            .excluded_fields
            .iter()
            .any(|f| f == "protocol_version"));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = AppConfig::parse(
            "[sync]\nrequire_revision = true\n\n[audit]\nmin_reason_len = 12\n",
        )
        .unwrap();
        assert!(config.sync.require_revision);
        assert_eq!(config.audit.min_reason_len, 12);
        assert_eq!(config.audit.excluded_fields.len(), 5);
        assert_eq!(config.server.request_timeout_secs, 30);
    }

    #[test]
    fn zero_values_are_rejected() {
        assert!(AppConfig::parse("[database]\nmax_connections = 0\n").is_err());
        assert!(AppConfig::parse("[server]\nrequest_timeout_secs = 0\n").is_err());
        assert!(AppConfig::parse("[audit]\nmin_reason_len = 0\n").is_err());
    }

    #[test]
    fn unknown_types_fail_to_parse() {
        assert!(AppConfig::parse("[server]\nport = \"eighty\"\n").is_err());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 9100").unwrap();
        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9100);
        assert!(AppConfig::load(Some(std::path::Path::new("/nonexistent/ecrf.toml"))).is_err());
        assert_eq!(AppConfig::load(None).unwrap().server.port, 7070);
    }
}

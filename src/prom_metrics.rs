//! # Prometheus Metrics
//!
//! Exposes eCRF service metrics in the Prometheus text exposition format.
//!
//! ## Metrics Exposed
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `ecrf_http_request_duration_seconds` | Histogram | `method`, `path` | Request latency |
//! | `ecrf_structure_sync_total` | Counter | `operation`, `outcome` | Structure sync calls by result |
//! | `ecrf_structure_nodes_written_total` | Counter | `level`, `action` | Rows inserted/updated/deleted by syncs |
//! | `ecrf_study_audit_records_total` | Counter | - | Audit rows appended |
//! | `ecrf_db_pool_connections` | Gauge | - | Open pool connections |
//! | `ecrf_db_pool_idle_connections` | Gauge | - | Idle pool connections |
//!
//! Pool gauges are sampled on each scrape of `/metrics`.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

use crate::db::SyncSummary;

#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct HttpLabel {
    pub method: String,
    pub path: String,
}

/// `operation` is one of `study_structure`, `form`, `section_order`;
/// `outcome` is `ok` or a [`crate::error::SyncError::kind`].
#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct SyncLabel {
    pub operation: String,
    pub outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct NodeLabel {
    pub level: String,
    pub action: String,
}

fn latency_histogram() -> Histogram {
    Histogram::new(exponential_buckets(0.005, 2.0, 12))
}

pub struct Metrics {
    pub registry: Registry,
    pub http_request_duration: Family<HttpLabel, Histogram, fn() -> Histogram>,
    pub structure_sync: Family<SyncLabel, Counter>,
    pub nodes_written: Family<NodeLabel, Counter>,
    pub audit_records: Counter,
    pub db_pool_connections: Gauge,
    pub db_pool_idle_connections: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_request_duration =
            Family::<HttpLabel, Histogram, fn() -> Histogram>::new_with_constructor(latency_histogram);
        registry.register(
            "ecrf_http_request_duration_seconds",
            "HTTP request latency by method and normalized path",
            http_request_duration.clone(),
        );

        let structure_sync = Family::<SyncLabel, Counter>::default();
        registry.register(
            "ecrf_structure_sync",
            "Structure synchronization calls by operation and outcome",
            structure_sync.clone(),
        );

        let nodes_written = Family::<NodeLabel, Counter>::default();
        registry.register(
            "ecrf_structure_nodes_written",
            "Structure rows written by synchronization, by level and action",
            nodes_written.clone(),
        );

        let audit_records = Counter::default();
        registry.register(
            "ecrf_study_audit_records",
            "Study audit rows appended",
            audit_records.clone(),
        );

        let db_pool_connections = Gauge::default();
        registry.register(
            "ecrf_db_pool_connections",
            "Open database pool connections",
            db_pool_connections.clone(),
        );

        let db_pool_idle_connections = Gauge::default();
        registry.register(
            "ecrf_db_pool_idle_connections",
            "Idle database pool connections",
            db_pool_idle_connections.clone(),
        );

        Self {
            registry,
            http_request_duration,
            structure_sync,
            nodes_written,
            audit_records,
            db_pool_connections,
            db_pool_idle_connections,
        }
    }

    /// Count one sync call and, on success, the rows it wrote.
    pub fn record_sync(&self, operation: &str, result: Result<&SyncSummary, &str>) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(kind) => kind,
        };
        self.structure_sync
            .get_or_create(&SyncLabel {
                operation: operation.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
        let Ok(summary) = result else {
            return;
        };
        for (level, counts) in [
            ("form", &summary.forms),
            ("section", &summary.sections),
            ("field", &summary.fields),
        ] {
            for (action, n) in [
                ("inserted", counts.inserted),
                ("updated", counts.updated),
                ("deleted", counts.deleted),
            ] {
                if n > 0 {
                    self.nodes_written
                        .get_or_create(&NodeLabel {
                            level: level.to_string(),
                            action: action.to_string(),
                        })
                        .inc_by(n as u64);
                }
            }
        }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        if let Err(e) = encode(&mut buf, &self.registry) {
            tracing::warn!(error = %e, "failed to encode metrics");
        }
        buf
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LevelCounts;

    #[test]
    fn metrics_encode_returns_valid_text() {
        let m = Metrics::new();
        m.db_pool_connections.set(3);
        m.audit_records.inc_by(2);
        m.http_request_duration
            .get_or_create(&HttpLabel {
                method: "GET".into(),
                path: "/forms/:uuid".into(),
            })
            .observe(0.02);

        let output = m.encode();
        assert!(output.contains("ecrf_db_pool_connections 3"));
        assert!(output.contains("ecrf_study_audit_records_total 2"));
        assert!(output.contains("ecrf_http_request_duration_seconds"));
        assert!(output.contains("/forms/:uuid"));
    }

    #[test]
    fn successful_sync_counts_written_rows() {
        let m = Metrics::new();
        let summary = SyncSummary {
            forms: LevelCounts {
                inserted: 1,
                updated: 0,
                deleted: 2,
            },
            ..Default::default()
        };
        m.record_sync("study_structure", Ok(&summary));

        let output = m.encode();
        assert!(output.contains("operation=\"study_structure\""));
        assert!(output.contains("outcome=\"ok\""));
        assert!(output.contains("level=\"form\",action=\"deleted\"} 2"));
        assert!(!output.contains("level=\"field\""));
    }

    #[test]
    fn failed_sync_records_error_kind_only() {
        let m = Metrics::new();
        m.record_sync("form", Err("conflict"));
        let output = m.encode();
        assert!(output.contains("outcome=\"conflict\""));
        assert!(!output.contains("action="));
    }
}

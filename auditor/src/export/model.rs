use crate::workflow::runner::AuditSummary;
use auditcore::disclosure::DisclosureCase;
use auditcore::ledger::AuditSnapshot;
use auditcore::telemetry::MetricsSnapshot;
use serde::{Deserialize, Serialize};

/// The report body served to external tooling: ledger snapshot, pipeline
/// counters, and all disclosure cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReportModel {
    pub generated_at: f64,
    pub metrics: MetricsSnapshot,
    pub snapshot: AuditSnapshot,
    pub cases: Vec<DisclosureCase>,
}

impl AuditReportModel {
    pub fn from_summary(summary: &AuditSummary) -> Self {
        Self {
            generated_at: summary.snapshot.generated_at,
            metrics: summary.metrics,
            snapshot: summary.snapshot.clone(),
            cases: summary.cases.clone(),
        }
    }
}

impl Default for AuditReportModel {
    fn default() -> Self {
        Self {
            generated_at: 0.0,
            metrics: MetricsSnapshot::default(),
            snapshot: AuditSnapshot::compile(0.0, Vec::new()),
            cases: Vec::new(),
        }
    }
}

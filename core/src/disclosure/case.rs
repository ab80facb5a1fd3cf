use crate::capture::transponder::TransponderKey;
use serde::{Deserialize, Serialize};

/// Lifecycle status of an operator notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseStatus {
    Pending,
    Notified,
    Acknowledged,
    Remediated,
    ClosedNoResponse,
}

impl CaseStatus {
    pub fn name(&self) -> &'static str {
        match self {
            CaseStatus::Pending => "PENDING",
            CaseStatus::Notified => "NOTIFIED",
            CaseStatus::Acknowledged => "ACKNOWLEDGED",
            CaseStatus::Remediated => "REMEDIATED",
            CaseStatus::ClosedNoResponse => "CLOSED_NO_RESPONSE",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self,
            CaseStatus::Pending | CaseStatus::Notified | CaseStatus::Acknowledged
        )
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One tracked disclosure toward a transponder's operator. At most one open
/// case per transponder; closed cases are retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisclosureCase {
    pub case_id: String,
    pub key: TransponderKey,
    pub created_ts: f64,
    pub status: CaseStatus,
    pub notified_ts: Option<f64>,
    pub acknowledged_ts: Option<f64>,
    pub closed_ts: Option<f64>,
}

impl DisclosureCase {
    pub fn open(key: TransponderKey, sequence: usize, created_ts: f64) -> Self {
        let case_id = format!(
            "case-{}-{}-{}",
            key.satellite.replace(' ', "_"),
            key.center_khz,
            sequence
        );
        Self {
            case_id,
            key,
            created_ts,
            status: CaseStatus::Pending,
            notified_ts: None,
            acknowledged_ts: None,
            closed_ts: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Whether the case has gone unacknowledged past the timeout.
    pub fn timed_out(&self, now: f64, timeout_secs: f64) -> bool {
        matches!(self.status, CaseStatus::Pending | CaseStatus::Notified)
            && now - self.created_ts >= timeout_secs
    }
}

use crate::capture::transponder::{AnalysisDepth, TransponderKey};
use crate::classify::verdict::Verdict;
use crate::traffic::TrafficCategory;
use serde::{Deserialize, Serialize};

/// What changed in a classification record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HistoryEvent {
    VerdictChange {
        from: Verdict,
        to: Verdict,
    },
    CategoryChange {
        from: Option<TrafficCategory>,
        to: TrafficCategory,
    },
}

/// One superseded state, retained forever. The live record is mutated in
/// place; every transition appends here first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: f64,
    pub event: HistoryEvent,
    pub confidence: f32,
    pub evidence_count: usize,
    /// Segment whose evidence caused the transition.
    pub segment_id: String,
}

/// The durable, current-state verdict for a transponder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub key: TransponderKey,
    pub verdict: Verdict,
    pub confidence: f32,
    /// Number of distinct segments folded; strictly increases.
    pub evidence_count: usize,
    pub first_seen: f64,
    pub last_updated: f64,
    pub traffic_category: Option<TrafficCategory>,
    pub analysis_depth: AnalysisDepth,
    /// Sticky structural PII hint from any contributing probe.
    pub pii_flagged: bool,
}

impl ClassificationRecord {
    pub fn new(key: TransponderKey, timestamp: f64) -> Self {
        Self {
            key,
            verdict: Verdict::Unknown,
            confidence: 0.0,
            evidence_count: 0,
            first_seen: timestamp,
            last_updated: timestamp,
            traffic_category: None,
            analysis_depth: AnalysisDepth::BroadbandScan,
            pii_flagged: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_record_starts_unknown_in_broadband_scan() {
        let record = ClassificationRecord::new(TransponderKey::new("X", 12_500_000, 30_000), 5.0);
        assert_eq!(record.verdict, Verdict::Unknown);
        assert_eq!(record.evidence_count, 0);
        assert_eq!(record.analysis_depth, AnalysisDepth::BroadbandScan);
        assert!(record.traffic_category.is_none());
    }
}

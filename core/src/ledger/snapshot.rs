use crate::capture::transponder::Transponder;
use crate::classify::verdict::Verdict;
use crate::ledger::record::{ClassificationRecord, HistoryEntry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Read-only view of one transponder's current state and full history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransponderSnapshot {
    pub transponder: Transponder,
    /// `None` for transponders observed only through rejected segments.
    pub record: Option<ClassificationRecord>,
    pub history: Vec<HistoryEntry>,
    pub disclosure_eligible: bool,
}

/// Per-satellite aggregate of the audit so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatelliteStats {
    pub satellite: String,
    pub total_transponders: usize,
    pub secure: usize,
    pub unencrypted: usize,
    pub obfuscated: usize,
    pub further_analysis: usize,
    /// Observed but never classified (all segments rejected).
    pub unclassified: usize,
    pub encryption_rate_pct: f32,
    pub plaintext_rate_pct: f32,
    pub pii_flag_count: usize,
    pub disclosure_required: usize,
}

/// Exported audit state: current records plus history, consumable by
/// reporting tooling outside this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSnapshot {
    pub generated_at: f64,
    pub transponders: Vec<TransponderSnapshot>,
    pub satellites: Vec<SatelliteStats>,
}

impl AuditSnapshot {
    pub fn compile(generated_at: f64, mut transponders: Vec<TransponderSnapshot>) -> Self {
        transponders.sort_by(|a, b| a.transponder.key.cmp(&b.transponder.key));

        let mut per_satellite: BTreeMap<String, SatelliteStats> = BTreeMap::new();
        for snapshot in &transponders {
            let stats = per_satellite
                .entry(snapshot.transponder.key.satellite.clone())
                .or_insert_with(|| SatelliteStats {
                    satellite: snapshot.transponder.key.satellite.clone(),
                    total_transponders: 0,
                    secure: 0,
                    unencrypted: 0,
                    obfuscated: 0,
                    further_analysis: 0,
                    unclassified: 0,
                    encryption_rate_pct: 0.0,
                    plaintext_rate_pct: 0.0,
                    pii_flag_count: 0,
                    disclosure_required: 0,
                });

            stats.total_transponders += 1;
            match snapshot.record.as_ref() {
                Some(record) => {
                    match record.verdict {
                        Verdict::Secure => stats.secure += 1,
                        Verdict::Unencrypted => stats.unencrypted += 1,
                        Verdict::Obfuscated => stats.obfuscated += 1,
                        Verdict::FurtherAnalysis => stats.further_analysis += 1,
                        Verdict::Unknown => stats.unclassified += 1,
                    }
                    if record.pii_flagged {
                        stats.pii_flag_count += 1;
                    }
                }
                None => stats.unclassified += 1,
            }
            if snapshot.disclosure_eligible {
                stats.disclosure_required += 1;
            }
        }

        for stats in per_satellite.values_mut() {
            let total = stats.total_transponders as f32;
            stats.encryption_rate_pct = stats.secure as f32 / total * 100.0;
            stats.plaintext_rate_pct = stats.unencrypted as f32 / total * 100.0;
        }

        Self {
            generated_at,
            transponders,
            satellites: per_satellite.into_values().collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

use anyhow::Context;
use auditcore::prelude::{EvidenceWeighting, PipelineConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const DAY_SECS: f64 = 24.0 * 3600.0;

/// Audit workflow thresholds, loadable from YAML.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub quality_floor: f32,
    pub min_duration_secs: f64,
    pub modulation_min_confidence: f32,
    pub decision_threshold: f32,
    pub conflict_margin: f32,
    pub min_disclosure_evidence: usize,
    pub min_disclosure_passes: usize,
    pub disclosure_timeout_days: f64,
    /// Bound of the ingest admission queue; senders block when it is full.
    pub queue_depth: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        let pipeline = PipelineConfig::default();
        Self {
            quality_floor: pipeline.quality_floor,
            min_duration_secs: pipeline.min_duration_secs,
            modulation_min_confidence: pipeline.modulation_min_confidence,
            decision_threshold: pipeline.decision_threshold,
            conflict_margin: pipeline.conflict_margin,
            min_disclosure_evidence: pipeline.min_disclosure_evidence,
            min_disclosure_passes: pipeline.min_disclosure_passes,
            disclosure_timeout_days: pipeline.disclosure_timeout_secs / DAY_SECS,
            queue_depth: 64,
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(quality_floor: f32, min_evidence: usize, timeout_days: f64) -> Self {
        Self {
            quality_floor,
            min_disclosure_evidence: min_evidence,
            disclosure_timeout_days: timeout_days,
            ..Self::default()
        }
    }

    pub fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            min_duration_secs: self.min_duration_secs,
            quality_floor: self.quality_floor,
            modulation_min_confidence: self.modulation_min_confidence,
            decision_threshold: self.decision_threshold,
            conflict_margin: self.conflict_margin,
            min_disclosure_evidence: self.min_disclosure_evidence,
            min_disclosure_passes: self.min_disclosure_passes,
            disclosure_timeout_secs: self.disclosure_timeout_days * DAY_SECS,
            weighting: EvidenceWeighting::Cumulative,
            ..PipelineConfig::default()
        }
    }
}

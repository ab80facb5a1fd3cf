use serde::{Deserialize, Serialize};

/// Policy knob for how older evidence is weighted against newer evidence.
///
/// The default is cumulative, evidence-weighted confidence with no decay.
/// `RecencyDecay` multiplies the standing per-verdict tallies by `factor`
/// before each new segment is folded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EvidenceWeighting {
    Cumulative,
    RecencyDecay { factor: f32 },
}

/// Shared configuration for the classification pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Segments shorter than this are rejected at ingest.
    pub min_duration_secs: f64,
    /// Segments with a signal-quality score below this are rejected at ingest.
    pub quality_floor: f32,
    /// Best rule score below this yields modulation UNKNOWN with confidence 0.
    pub modulation_min_confidence: f32,
    /// Evidence confidence below this contributes to FURTHER_ANALYSIS only.
    pub decision_threshold: f32,
    /// SECURE and UNENCRYPTED tallies within this relative margin of each
    /// other count as conflicting evidence.
    pub conflict_margin: f32,
    /// Minimum folded segments before UNENCRYPTED may open a disclosure case.
    pub min_disclosure_evidence: usize,
    /// Minimum distinct observation passes before a case may open.
    pub min_disclosure_passes: usize,
    /// Open cases with no acknowledgment auto-close after this long.
    pub disclosure_timeout_secs: f64,
    /// Per-key lock acquisition attempts before surfacing LedgerContention.
    pub contention_retry_budget: usize,
    /// Base backoff between lock retries, scaled linearly per attempt.
    pub contention_backoff_ms: u64,
    pub weighting: EvidenceWeighting,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: 1.0,
            quality_floor: 0.25,
            modulation_min_confidence: 0.4,
            decision_threshold: 0.35,
            conflict_margin: 0.25,
            min_disclosure_evidence: 3,
            min_disclosure_passes: 2,
            disclosure_timeout_secs: 90.0 * 24.0 * 3600.0,
            contention_retry_budget: 8,
            contention_backoff_ms: 5,
            weighting: EvidenceWeighting::Cumulative,
        }
    }
}

/// Common error type for pipeline execution.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("ledger contention: {0}")]
    LedgerContention(String),
    #[error("invalid segment: {0}")]
    InvalidSegment(String),
    #[error("internal failure: {0}")]
    Internal(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Trait describing the lifecycle of a classification pipeline stage.
///
/// Stages are constructed per segment, initialized with the shared config,
/// executed once, and cleaned up. Input and output types differ per stage,
/// so the trait carries them as associated types.
pub trait PipelineStage {
    type Input;
    type Output;

    fn initialize(&mut self, config: &PipelineConfig) -> PipelineResult<()>;
    fn execute(&mut self, input: Self::Input) -> PipelineResult<Self::Output>;
    fn cleanup(&mut self);
}

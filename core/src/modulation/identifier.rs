//! Deterministic modulation identification.
//!
//! Each candidate label is scored by a fixed set of named, weighted rules
//! over the extracted feature vector; the aggregate is the weighted mean of
//! the rule scores. The best-scoring label wins when its aggregate clears
//! the configured minimum confidence, otherwise the segment is labeled
//! UNKNOWN with confidence 0, which still flows downstream, since
//! persistent UNKNOWN is evidence of non-standard encoding.
//!
//! Rule table (weights in parentheses):
//! - DVB-S: qpsk-order (0.35), continuous-envelope (0.30),
//!   single-carrier (0.15), wide-occupancy (0.20)
//! - DVB-S2: psk-apsk-order (0.30), continuous-envelope (0.25),
//!   single-carrier (0.15), high-occupancy (0.20), ring-structure (0.10)
//! - DVB-S2X: high-order (0.50), continuous-envelope (0.25),
//!   single-carrier (0.25)
//! - SCPC: narrow-occupancy (0.55), single-carrier (0.25),
//!   continuous-envelope (0.20)
//! - MCPC: multi-carrier (0.60), aggregate-occupancy (0.20),
//!   continuous-envelope (0.20)
//! - TDMA: burst-envelope (0.65), single-carrier (0.35)

use crate::capture::segment::CaptureSegment;
use crate::modulation::features::{FeatureExtractor, SignalFeatures};
use crate::prelude::{PipelineConfig, PipelineError, PipelineResult, PipelineStage};
use crate::telemetry::log::LogManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModulationLabel {
    DvbS,
    DvbS2,
    DvbS2x,
    Scpc,
    Mcpc,
    Tdma,
    Unknown,
}

impl ModulationLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModulationLabel::DvbS => "DVB-S",
            ModulationLabel::DvbS2 => "DVB-S2",
            ModulationLabel::DvbS2x => "DVB-S2X",
            ModulationLabel::Scpc => "SCPC",
            ModulationLabel::Mcpc => "MCPC",
            ModulationLabel::Tdma => "TDMA",
            ModulationLabel::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for ModulationLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One evaluated rule, kept on the result so verdicts stay explainable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleScore {
    pub rule: String,
    pub weight: f32,
    pub score: f32,
}

impl RuleScore {
    fn new(rule: &str, weight: f32, score: f32) -> Self {
        Self {
            rule: rule.to_string(),
            weight,
            score: score.clamp(0.0, 1.0),
        }
    }
}

/// Immutable per-segment modulation verdict. Produced once; never retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulationResult {
    pub segment_id: String,
    pub label: ModulationLabel,
    pub confidence: f32,
    pub features: SignalFeatures,
    pub rule_scores: Vec<RuleScore>,
}

/// Score 1 inside [lo, hi], falling linearly to 0 over `soft` outside.
fn range_score(value: f32, lo: f32, hi: f32, soft: f32) -> f32 {
    if value >= lo && value <= hi {
        1.0
    } else if value < lo {
        (1.0 - (lo - value) / soft).max(0.0)
    } else {
        (1.0 - (value - hi) / soft).max(0.0)
    }
}

fn continuous_envelope(weight: f32, f: &SignalFeatures) -> RuleScore {
    RuleScore::new(
        "continuous-envelope",
        weight,
        range_score(f.envelope_duty_cycle, 0.9, 1.0, 0.2),
    )
}

fn single_carrier(weight: f32, f: &SignalFeatures) -> RuleScore {
    let score = if f.spectral_peak_count == 1 { 1.0 } else { 0.0 };
    RuleScore::new("single-carrier", weight, score)
}

fn rules_for(label: ModulationLabel, f: &SignalFeatures) -> Vec<RuleScore> {
    let order = f.constellation_order_hint as f32;
    match label {
        ModulationLabel::DvbS => vec![
            RuleScore::new("qpsk-order", 0.35, range_score(order, 2.0, 6.0, 4.0)),
            continuous_envelope(0.30, f),
            single_carrier(0.15, f),
            RuleScore::new(
                "wide-occupancy",
                0.20,
                range_score(f.spectral_occupancy, 0.55, 0.95, 0.2),
            ),
        ],
        ModulationLabel::DvbS2 => vec![
            RuleScore::new("psk-apsk-order", 0.30, range_score(order, 4.0, 20.0, 4.0)),
            continuous_envelope(0.25, f),
            single_carrier(0.15, f),
            RuleScore::new(
                "high-occupancy",
                0.20,
                range_score(f.spectral_occupancy, 0.7, 1.0, 0.2),
            ),
            RuleScore::new(
                "ring-structure",
                0.10,
                range_score(f.amplitude_kurtosis, -2.0, 0.5, 1.0),
            ),
        ],
        ModulationLabel::DvbS2x => vec![
            RuleScore::new("high-order", 0.50, range_score(order, 20.0, 81.0, 8.0)),
            continuous_envelope(0.25, f),
            single_carrier(0.25, f),
        ],
        ModulationLabel::Scpc => vec![
            RuleScore::new(
                "narrow-occupancy",
                0.55,
                range_score(f.spectral_occupancy, 0.0, 0.35, 0.15),
            ),
            single_carrier(0.25, f),
            continuous_envelope(0.20, f),
        ],
        ModulationLabel::Mcpc => vec![
            RuleScore::new(
                "multi-carrier",
                0.60,
                ((f.spectral_peak_count.saturating_sub(1)) as f32 / 3.0).min(1.0),
            ),
            RuleScore::new(
                "aggregate-occupancy",
                0.20,
                range_score(f.spectral_occupancy, 0.4, 1.0, 0.2),
            ),
            continuous_envelope(0.20, f),
        ],
        ModulationLabel::Tdma => vec![
            RuleScore::new(
                "burst-envelope",
                0.65,
                range_score(f.envelope_duty_cycle, 0.0, 0.5, 0.35),
            ),
            single_carrier(0.35, f),
        ],
        ModulationLabel::Unknown => Vec::new(),
    }
}

fn aggregate(scores: &[RuleScore]) -> f32 {
    let total_weight: f32 = scores.iter().map(|s| s.weight).sum();
    if total_weight <= f32::EPSILON {
        return 0.0;
    }
    scores.iter().map(|s| s.weight * s.score).sum::<f32>() / total_weight
}

const CANDIDATES: [ModulationLabel; 6] = [
    ModulationLabel::DvbS,
    ModulationLabel::DvbS2,
    ModulationLabel::DvbS2x,
    ModulationLabel::Scpc,
    ModulationLabel::Mcpc,
    ModulationLabel::Tdma,
];

/// Stateless classification of a feature vector against the rule table.
pub fn identify(features: &SignalFeatures, min_confidence: f32) -> ModulationResult {
    let mut best_label = ModulationLabel::Unknown;
    let mut best_scores = Vec::new();
    let mut best_confidence = 0.0f32;

    for label in CANDIDATES {
        let scores = rules_for(label, features);
        let confidence = aggregate(&scores);
        if confidence > best_confidence {
            best_label = label;
            best_scores = scores;
            best_confidence = confidence;
        }
    }

    if best_confidence < min_confidence {
        return ModulationResult {
            segment_id: String::new(),
            label: ModulationLabel::Unknown,
            confidence: 0.0,
            features: features.clone(),
            rule_scores: best_scores,
        };
    }

    ModulationResult {
        segment_id: String::new(),
        label: best_label,
        confidence: best_confidence,
        features: features.clone(),
        rule_scores: best_scores,
    }
}

/// Modulation identification stage wrapping the feature-extractor capability.
pub struct ModulationIdentifier {
    extractor: Arc<dyn FeatureExtractor>,
    config: Option<PipelineConfig>,
    logger: LogManager,
}

impl ModulationIdentifier {
    pub fn new(extractor: Arc<dyn FeatureExtractor>) -> Self {
        Self {
            extractor,
            config: None,
            logger: LogManager::new(),
        }
    }
}

impl PipelineStage for ModulationIdentifier {
    type Input = CaptureSegment;
    /// `None` means features could not be extracted; the segment then
    /// contributes no evidence and counts as rejected.
    type Output = Option<ModulationResult>;

    fn initialize(&mut self, config: &PipelineConfig) -> PipelineResult<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, segment: CaptureSegment) -> PipelineResult<Option<ModulationResult>> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| PipelineError::Internal("stage not initialized".into()))?;

        let features = match self.extractor.extract(&segment) {
            Some(features) => features,
            None => return Ok(None),
        };

        let mut result = identify(&features, config.modulation_min_confidence);
        result.segment_id = segment.segment_id.clone();
        self.logger.record(&format!(
            "Modulation {} -> {} ({:.2})",
            segment.segment_id, result.label, result.confidence
        ));
        Ok(Some(result))
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}

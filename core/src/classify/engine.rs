//! Evidence folding for the encryption-status state machine.
//!
//! Each processed segment contributes one leaning (SECURE, UNENCRYPTED,
//! OBFUSCATED, or FURTHER_ANALYSIS) with a weight of evidence confidence
//! times segment quality. Weights accumulate per verdict (cumulative by
//! default; recency decay as a policy knob) and the verdict is the heaviest
//! tally, except that near-equal SECURE and UNENCRYPTED tallies are treated
//! as conflicting evidence and resolve to FURTHER_ANALYSIS. Exact ties fall
//! back to the conservative ordering.
//!
//! Reported confidence per verdict combines supporting weights as
//! `1 - Π(1 - wᵢ)`: never decreasing, and at least the max of prior and new
//! evidence confidence.

use crate::classify::verdict::Verdict;
use crate::modulation::identifier::{ModulationLabel, ModulationResult};
use crate::prelude::{EvidenceWeighting, PipelineConfig};
use crate::probes::{ProbeOutcome, ProbeReport};

/// Weight floor so every folded segment leaves a trace; a transponder with
/// evidence can therefore never read as UNKNOWN again.
const FURTHER_BASE_CONFIDENCE: f32 = 0.3;

const WEIGHT_EPSILON: f32 = 1e-6;

/// Everything one segment contributes to a transponder's classification.
#[derive(Debug, Clone)]
pub struct SegmentEvidence {
    pub segment_id: String,
    pub pass_id: String,
    pub timestamp: f64,
    pub quality: f32,
    pub modulation: ModulationResult,
    pub probe: Option<ProbeReport>,
}

/// Per-verdict accumulated weights plus the combined-confidence tracks.
#[derive(Debug, Clone, Default)]
pub struct EvidenceTally {
    pub secure: f32,
    pub unencrypted: f32,
    pub obfuscated: f32,
    pub further: f32,
    secure_conf: f32,
    unencrypted_conf: f32,
    obfuscated_conf: f32,
    further_conf: f32,
}

impl EvidenceTally {
    fn decay(&mut self, factor: f32) {
        self.secure *= factor;
        self.unencrypted *= factor;
        self.obfuscated *= factor;
        self.further *= factor;
    }

    fn accumulate(&mut self, leaning: Verdict, weight: f32) {
        let (tally, conf) = match leaning {
            Verdict::Secure => (&mut self.secure, &mut self.secure_conf),
            Verdict::Unencrypted => (&mut self.unencrypted, &mut self.unencrypted_conf),
            Verdict::Obfuscated => (&mut self.obfuscated, &mut self.obfuscated_conf),
            _ => (&mut self.further, &mut self.further_conf),
        };
        *tally += weight;
        *conf = 1.0 - (1.0 - *conf) * (1.0 - weight.clamp(0.0, 1.0));
    }

    fn confidence_of(&self, verdict: Verdict) -> f32 {
        match verdict {
            Verdict::Secure => self.secure_conf,
            Verdict::Unencrypted => self.unencrypted_conf,
            Verdict::Obfuscated => self.obfuscated_conf,
            Verdict::FurtherAnalysis => self.further_conf,
            Verdict::Unknown => 0.0,
        }
    }
}

/// Outcome of folding one segment: the standing verdict and its confidence.
#[derive(Debug, Clone)]
pub struct FoldDecision {
    pub verdict: Verdict,
    pub confidence: f32,
    /// Structural PII hint carried through from the probe.
    pub pii_suspected: bool,
}

/// Which verdict a single segment's evidence supports, and how strongly.
fn lean(evidence: &SegmentEvidence, config: &PipelineConfig) -> (Verdict, f32) {
    let modulation_known = evidence.modulation.label != ModulationLabel::Unknown;

    let (leaning, confidence) = match &evidence.probe {
        Some(report) => match &report.outcome {
            ProbeOutcome::EncryptionHandshake { .. } | ProbeOutcome::ScrambledTransport => {
                (Verdict::Secure, report.confidence)
            }
            ProbeOutcome::StructuredPlaintext { .. } if modulation_known => (
                Verdict::Unencrypted,
                report.confidence * evidence.modulation.confidence,
            ),
            ProbeOutcome::HighEntropy if modulation_known => (
                Verdict::Obfuscated,
                report.confidence * evidence.modulation.confidence,
            ),
            // Modulation UNKNOWN or no payload structure either way.
            _ => (Verdict::FurtherAnalysis, FURTHER_BASE_CONFIDENCE),
        },
        None => (Verdict::FurtherAnalysis, FURTHER_BASE_CONFIDENCE),
    };

    // Sub-threshold evidence is not allowed to drive a stable verdict.
    if leaning != Verdict::FurtherAnalysis && confidence < config.decision_threshold {
        return (
            Verdict::FurtherAnalysis,
            confidence.max(FURTHER_BASE_CONFIDENCE),
        );
    }

    (leaning, confidence)
}

fn pii_hint(evidence: &SegmentEvidence) -> bool {
    matches!(
        evidence.probe.as_ref().map(|r| &r.outcome),
        Some(ProbeOutcome::StructuredPlaintext {
            pii_suspected: true,
            ..
        })
    )
}

/// Fold one segment into the tally and return the standing verdict.
pub fn fold(
    tally: &mut EvidenceTally,
    evidence: &SegmentEvidence,
    config: &PipelineConfig,
) -> FoldDecision {
    if let EvidenceWeighting::RecencyDecay { factor } = config.weighting {
        tally.decay(factor.clamp(0.0, 1.0));
    }

    let (leaning, confidence) = lean(evidence, config);
    let weight = (confidence * evidence.quality).max(WEIGHT_EPSILON);
    tally.accumulate(leaning, weight);

    let conflict = tally.secure > WEIGHT_EPSILON
        && tally.unencrypted > WEIGHT_EPSILON
        && (tally.secure - tally.unencrypted).abs()
            <= config.conflict_margin * tally.secure.max(tally.unencrypted);

    let verdict = if conflict {
        Verdict::FurtherAnalysis
    } else {
        select_heaviest(tally)
    };

    let confidence = if conflict {
        // Conflicting evidence caps certainty at the weaker side.
        tally
            .confidence_of(Verdict::Secure)
            .min(tally.confidence_of(Verdict::Unencrypted))
            .max(tally.confidence_of(Verdict::FurtherAnalysis))
    } else {
        tally.confidence_of(verdict)
    };

    FoldDecision {
        verdict,
        confidence,
        pii_suspected: pii_hint(evidence),
    }
}

fn select_heaviest(tally: &EvidenceTally) -> Verdict {
    let candidates = [
        (Verdict::Secure, tally.secure),
        (Verdict::Unencrypted, tally.unencrypted),
        (Verdict::Obfuscated, tally.obfuscated),
        (Verdict::FurtherAnalysis, tally.further),
    ];

    let mut best = Verdict::FurtherAnalysis;
    let mut best_weight = 0.0f32;
    for (verdict, weight) in candidates {
        let heavier = weight > best_weight + WEIGHT_EPSILON;
        let tied = (weight - best_weight).abs() <= WEIGHT_EPSILON
            && verdict.conservative_rank() > best.conservative_rank();
        if heavier || tied {
            best = verdict;
            best_weight = weight;
        }
    }
    best
}

/// Whether a record's standing may open a disclosure case. A single segment
/// is never sufficient.
pub fn disclosure_eligible(
    verdict: Verdict,
    evidence_count: usize,
    distinct_passes: usize,
    config: &PipelineConfig,
) -> bool {
    verdict == Verdict::Unencrypted
        && evidence_count >= config.min_disclosure_evidence
        && distinct_passes >= config.min_disclosure_passes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modulation::identifier::RuleScore;

    fn modulation(label: ModulationLabel, confidence: f32) -> ModulationResult {
        ModulationResult {
            segment_id: "seg".into(),
            label,
            confidence,
            features: Default::default(),
            rule_scores: Vec::<RuleScore>::new(),
        }
    }

    fn evidence(
        segment: &str,
        pass: &str,
        quality: f32,
        label: ModulationLabel,
        mod_conf: f32,
        outcome: Option<ProbeOutcome>,
        probe_conf: f32,
    ) -> SegmentEvidence {
        SegmentEvidence {
            segment_id: segment.into(),
            pass_id: pass.into(),
            timestamp: 0.0,
            quality,
            modulation: modulation(label, mod_conf),
            probe: outcome.map(|outcome| ProbeReport {
                segment_id: segment.into(),
                outcome,
                confidence: probe_conf,
                entropy_bits_per_byte: 6.0,
            }),
        }
    }

    fn handshake(segment: &str, quality: f32) -> SegmentEvidence {
        evidence(
            segment,
            "pass-1",
            quality,
            ModulationLabel::DvbS2,
            0.9,
            Some(ProbeOutcome::EncryptionHandshake {
                protocol: "TLS".into(),
            }),
            0.9,
        )
    }

    fn plaintext(segment: &str, pass: &str, quality: f32) -> SegmentEvidence {
        evidence(
            segment,
            pass,
            quality,
            ModulationLabel::DvbS2,
            0.9,
            Some(ProbeOutcome::StructuredPlaintext {
                marker: "MPEG-TS clear".into(),
                printable_fraction: 0.9,
                pii_suspected: false,
            }),
            0.9,
        )
    }

    #[test]
    fn repeated_handshakes_converge_to_secure_with_rising_confidence() {
        let config = PipelineConfig::default();
        let mut tally = EvidenceTally::default();

        let first = fold(&mut tally, &handshake("s1", 0.9), &config);
        let second = fold(&mut tally, &handshake("s2", 0.9), &config);
        let third = fold(&mut tally, &handshake("s3", 0.9), &config);

        assert_eq!(first.verdict, Verdict::Secure);
        assert_eq!(third.verdict, Verdict::Secure);
        assert!(second.confidence > first.confidence);
        assert!(third.confidence > second.confidence);
    }

    #[test]
    fn plaintext_with_recognized_modulation_reads_unencrypted() {
        let config = PipelineConfig::default();
        let mut tally = EvidenceTally::default();
        let decision = fold(&mut tally, &plaintext("s1", "pass-1", 0.9), &config);
        assert_eq!(decision.verdict, Verdict::Unencrypted);
    }

    #[test]
    fn unknown_modulation_keeps_the_verdict_at_further_analysis() {
        let config = PipelineConfig::default();
        let mut tally = EvidenceTally::default();
        let decision = fold(
            &mut tally,
            &evidence(
                "s1",
                "pass-1",
                0.4,
                ModulationLabel::Unknown,
                0.0,
                Some(ProbeOutcome::StructuredPlaintext {
                    marker: "ASCII".into(),
                    printable_fraction: 0.8,
                    pii_suspected: false,
                }),
                0.8,
            ),
            &config,
        );
        assert_eq!(decision.verdict, Verdict::FurtherAnalysis);
    }

    #[test]
    fn high_entropy_without_markers_reads_obfuscated() {
        let config = PipelineConfig::default();
        let mut tally = EvidenceTally::default();
        let decision = fold(
            &mut tally,
            &evidence(
                "s1",
                "pass-1",
                0.8,
                ModulationLabel::DvbS,
                0.85,
                Some(ProbeOutcome::HighEntropy),
                0.8,
            ),
            &config,
        );
        assert_eq!(decision.verdict, Verdict::Obfuscated);
    }

    #[test]
    fn equal_conflicting_evidence_never_yields_unencrypted() {
        let config = PipelineConfig::default();
        let mut tally = EvidenceTally::default();
        fold(&mut tally, &handshake("s1", 0.9), &config);
        let decision = fold(&mut tally, &plaintext("s2", "pass-2", 0.9), &config);
        assert!(matches!(
            decision.verdict,
            Verdict::FurtherAnalysis | Verdict::Secure
        ));
        assert_ne!(decision.verdict, Verdict::Unencrypted);
    }

    #[test]
    fn probe_failure_contributes_weak_further_analysis_evidence() {
        let config = PipelineConfig::default();
        let mut tally = EvidenceTally::default();
        let decision = fold(
            &mut tally,
            &evidence("s1", "pass-1", 0.5, ModulationLabel::DvbS2, 0.9, None, 0.0),
            &config,
        );
        assert_eq!(decision.verdict, Verdict::FurtherAnalysis);
        assert!(tally.further > 0.0);
    }

    #[test]
    fn strong_unencrypted_evidence_outweighs_stale_conflict() {
        let config = PipelineConfig::default();
        let mut tally = EvidenceTally::default();
        fold(&mut tally, &handshake("s1", 0.5), &config);
        for (i, pass) in ["pass-2", "pass-3", "pass-4", "pass-5"].iter().enumerate() {
            fold(
                &mut tally,
                &plaintext(&format!("s{}", i + 2), pass, 0.95),
                &config,
            );
        }
        let decision = fold(&mut tally, &plaintext("s9", "pass-6", 0.95), &config);
        assert_eq!(decision.verdict, Verdict::Unencrypted);
    }

    #[test]
    fn recency_decay_discounts_older_evidence() {
        let config = PipelineConfig {
            weighting: EvidenceWeighting::RecencyDecay { factor: 0.5 },
            ..PipelineConfig::default()
        };
        let mut tally = EvidenceTally::default();
        fold(&mut tally, &handshake("s1", 0.9), &config);
        let after_one = tally.secure;
        fold(&mut tally, &plaintext("s2", "pass-2", 0.9), &config);
        assert!(tally.secure < after_one);
    }

    #[test]
    fn eligibility_needs_count_and_distinct_passes() {
        let config = PipelineConfig::default();
        assert!(!disclosure_eligible(Verdict::Unencrypted, 2, 2, &config));
        assert!(!disclosure_eligible(Verdict::Unencrypted, 3, 1, &config));
        assert!(!disclosure_eligible(Verdict::Secure, 5, 3, &config));
        assert!(disclosure_eligible(Verdict::Unencrypted, 3, 2, &config));
    }

    #[test]
    fn pii_hint_carries_through_the_decision() {
        let config = PipelineConfig::default();
        let mut tally = EvidenceTally::default();
        let decision = fold(
            &mut tally,
            &evidence(
                "s1",
                "pass-1",
                0.9,
                ModulationLabel::DvbS2,
                0.9,
                Some(ProbeOutcome::StructuredPlaintext {
                    marker: "ASCII".into(),
                    printable_fraction: 0.9,
                    pii_suspected: true,
                }),
                0.9,
            ),
            &config,
        );
        assert!(decision.pii_suspected);
    }
}

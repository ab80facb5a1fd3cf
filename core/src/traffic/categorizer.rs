//! Rule-based traffic categorization for unencrypted transponders.
//!
//! Categories are assigned from structural markers only. Rule table
//! (weights in parentheses):
//! - TELECOM_BACKHAUL: MPEG-TS framing (0.4), high stream diversity ≥ 16
//!   (0.4), periodic timing (0.2)
//! - ENTERPRISE_VSAT: MPEG-TS or HDLC framing (0.3), moderate diversity
//!   2–15 (0.4), mid frame length 64–512 or TS packets (0.3)
//! - GOVERNMENT: fixed-rate framing with regularity ≥ 0.95 (0.5), low
//!   diversity 1–2 (0.5)
//! - IOT_SCADA: short frames ≤ 64 (0.5), HDLC-style flags (0.3), periodic
//!   polling cadence ≥ 0.8 (0.2)
//!
//! The best aggregate below 0.45 yields UNKNOWN.

use crate::modulation::identifier::RuleScore;
use crate::traffic::fingerprint::{TrafficFingerprint, TransportFraming};
use crate::traffic::TrafficCategory;
use serde::{Deserialize, Serialize};

const MIN_CATEGORY_CONFIDENCE: f32 = 0.45;

/// Category assignment with the rule scores that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDecision {
    pub category: TrafficCategory,
    pub confidence: f32,
    pub rule_scores: Vec<RuleScore>,
}

fn score(rule: &str, weight: f32, hit: bool) -> RuleScore {
    RuleScore {
        rule: rule.to_string(),
        weight,
        score: if hit { 1.0 } else { 0.0 },
    }
}

fn rules_for(category: TrafficCategory, f: &TrafficFingerprint) -> Vec<RuleScore> {
    match category {
        TrafficCategory::TelecomBackhaul => vec![
            score("ts-framing", 0.4, f.framing == TransportFraming::MpegTs),
            score("high-diversity", 0.4, f.stream_diversity >= 16),
            score("periodic-timing", 0.2, f.timing_regularity >= 0.9),
        ],
        TrafficCategory::EnterpriseVsat => vec![
            score(
                "known-framing",
                0.3,
                f.framing != TransportFraming::Unknown,
            ),
            score(
                "moderate-diversity",
                0.4,
                (2..16).contains(&f.stream_diversity),
            ),
            score(
                "mid-frame-length",
                0.3,
                (64.0..=512.0).contains(&f.mean_frame_len)
                    || f.framing == TransportFraming::MpegTs,
            ),
        ],
        TrafficCategory::Government => vec![
            score("fixed-rate-framing", 0.5, f.timing_regularity >= 0.95),
            score("low-diversity", 0.5, (1..=2).contains(&f.stream_diversity)),
        ],
        TrafficCategory::IotScada => vec![
            score("short-frames", 0.5, f.mean_frame_len <= 64.0),
            score("flag-framing", 0.3, f.framing == TransportFraming::Hdlc),
            score("polling-cadence", 0.2, f.timing_regularity >= 0.8),
        ],
        TrafficCategory::Unknown => Vec::new(),
    }
}

fn aggregate(scores: &[RuleScore]) -> f32 {
    let total: f32 = scores.iter().map(|s| s.weight).sum();
    if total <= f32::EPSILON {
        return 0.0;
    }
    scores.iter().map(|s| s.weight * s.score).sum::<f32>() / total
}

const CANDIDATES: [TrafficCategory; 4] = [
    TrafficCategory::TelecomBackhaul,
    TrafficCategory::EnterpriseVsat,
    TrafficCategory::Government,
    TrafficCategory::IotScada,
];

/// Assign a traffic category from structural markers.
pub fn categorize(fingerprint: &TrafficFingerprint) -> CategoryDecision {
    let mut best = TrafficCategory::Unknown;
    let mut best_scores = Vec::new();
    let mut best_confidence = 0.0f32;

    for category in CANDIDATES {
        let scores = rules_for(category, fingerprint);
        let confidence = aggregate(&scores);
        if confidence > best_confidence {
            best = category;
            best_scores = scores;
            best_confidence = confidence;
        }
    }

    if best_confidence < MIN_CATEGORY_CONFIDENCE {
        return CategoryDecision {
            category: TrafficCategory::Unknown,
            confidence: best_confidence,
            rule_scores: best_scores,
        };
    }

    CategoryDecision {
        category: best,
        confidence: best_confidence,
        rule_scores: best_scores,
    }
}

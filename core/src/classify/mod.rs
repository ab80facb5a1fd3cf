pub mod engine;
pub mod verdict;

pub use engine::{disclosure_eligible, fold, EvidenceTally, FoldDecision, SegmentEvidence};
pub use verdict::Verdict;

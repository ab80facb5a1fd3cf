use crate::capture::transponder::{TransponderKey, TransponderMeta};
use serde::{Deserialize, Serialize};

/// Opaque handle for retrieving raw samples from the capture store.
///
/// The core never duplicates sample data; it only passes this reference to
/// the collaborator capabilities that need it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleRef(pub String);

/// One windowed recording of a transponder, as delivered by the capture
/// source. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSegment {
    pub segment_id: String,
    pub key: TransponderKey,
    /// Observation pass the segment was recorded in. Disclosure eligibility
    /// counts distinct pass ids.
    pub pass_id: String,
    pub start_ts: f64,
    pub end_ts: f64,
    pub sample_rate_hz: f64,
    pub sample_ref: SampleRef,
    /// Signal-quality score in [0, 1], derived from the estimated SNR.
    pub quality: f32,
    pub carrier_to_noise_db: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transponder_meta: Option<TransponderMeta>,
}

impl CaptureSegment {
    pub fn duration_secs(&self) -> f64 {
        (self.end_ts - self.start_ts).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: f64, end: f64) -> CaptureSegment {
        CaptureSegment {
            segment_id: "seg-1".into(),
            key: TransponderKey::new("X", 12_500_000, 30_000),
            pass_id: "pass-1".into(),
            start_ts: start,
            end_ts: end,
            sample_rate_hz: 2_000_000.0,
            sample_ref: SampleRef("cap/seg-1".into()),
            quality: 0.8,
            carrier_to_noise_db: Some(11.5),
            transponder_meta: None,
        }
    }

    #[test]
    fn duration_is_window_length() {
        assert_eq!(segment(10.0, 14.5).duration_secs(), 4.5);
    }

    #[test]
    fn duration_never_goes_negative() {
        assert_eq!(segment(20.0, 10.0).duration_secs(), 0.0);
    }
}

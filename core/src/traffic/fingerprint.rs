use crate::capture::segment::CaptureSegment;
use crate::probes::Demodulator;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

const TS_PACKET_LEN: usize = 188;
const TS_SYNC: u8 = 0x47;
const HDLC_FLAG: u8 = 0x7e;

/// Transport framing detected in the payload stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportFraming {
    MpegTs,
    Hdlc,
    Unknown,
}

/// Structural traffic markers for one segment: framing, stream diversity,
/// frame sizing, and timing regularity. Decoded content is never inspected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficFingerprint {
    pub framing: TransportFraming,
    /// Distinct stream identifiers (PIDs for MPEG-TS).
    pub stream_diversity: usize,
    pub mean_frame_len: f32,
    /// 1.0 for perfectly periodic framing, falling toward 0 as frame gaps
    /// spread out.
    pub timing_regularity: f32,
}

/// Pure capability from segment reference to structural traffic markers.
pub trait TrafficFingerprinter: Send + Sync {
    fn fingerprint(&self, segment: &CaptureSegment) -> Option<TrafficFingerprint>;
}

/// Default fingerprinter reading framing structure from the demodulated
/// byte stream.
pub struct TransportFingerprinter {
    demodulator: Arc<dyn Demodulator>,
}

impl TransportFingerprinter {
    pub fn new(demodulator: Arc<dyn Demodulator>) -> Self {
        Self { demodulator }
    }

    fn mpeg_ts(bytes: &[u8]) -> Option<TrafficFingerprint> {
        let start = (0..bytes.len().min(TS_PACKET_LEN)).find(|&i| {
            bytes.get(i) == Some(&TS_SYNC)
                && bytes.get(i + TS_PACKET_LEN) == Some(&TS_SYNC)
                && bytes.get(i + 2 * TS_PACKET_LEN) == Some(&TS_SYNC)
        })?;

        let mut pids = HashSet::new();
        let mut packets = 0usize;
        let mut offset = start;
        while offset + TS_PACKET_LEN <= bytes.len() && bytes[offset] == TS_SYNC {
            let pid = ((bytes[offset + 1] as u16 & 0x1f) << 8) | bytes[offset + 2] as u16;
            pids.insert(pid);
            packets += 1;
            offset += TS_PACKET_LEN;
        }
        if packets < 5 {
            return None;
        }

        Some(TrafficFingerprint {
            framing: TransportFraming::MpegTs,
            stream_diversity: pids.len(),
            mean_frame_len: TS_PACKET_LEN as f32,
            // Fixed-length sync framing is periodic by construction.
            timing_regularity: 1.0,
        })
    }

    fn hdlc(bytes: &[u8]) -> Option<TrafficFingerprint> {
        let flags: Vec<usize> = bytes
            .iter()
            .enumerate()
            .filter(|(_, &b)| b == HDLC_FLAG)
            .map(|(i, _)| i)
            .collect();
        if flags.len() < 4 {
            return None;
        }

        let gaps: Vec<f32> = flags.windows(2).map(|w| (w[1] - w[0]) as f32).collect();
        let mean = gaps.iter().sum::<f32>() / gaps.len() as f32;
        if mean < 4.0 {
            return None;
        }
        let variance = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f32>() / gaps.len() as f32;
        let regularity = 1.0 / (1.0 + variance.sqrt() / mean);

        // First byte after each flag stands in for a stream id.
        let streams: HashSet<u8> = flags
            .iter()
            .filter_map(|&i| bytes.get(i + 1))
            .copied()
            .collect();

        Some(TrafficFingerprint {
            framing: TransportFraming::Hdlc,
            stream_diversity: streams.len(),
            mean_frame_len: mean,
            timing_regularity: regularity,
        })
    }
}

impl TrafficFingerprinter for TransportFingerprinter {
    fn fingerprint(&self, segment: &CaptureSegment) -> Option<TrafficFingerprint> {
        let bytes = self.demodulator.demodulate(segment)?;
        if bytes.len() < TS_PACKET_LEN {
            return None;
        }

        if let Some(fingerprint) = Self::mpeg_ts(&bytes) {
            return Some(fingerprint);
        }
        if let Some(fingerprint) = Self::hdlc(&bytes) {
            return Some(fingerprint);
        }

        Some(TrafficFingerprint {
            framing: TransportFraming::Unknown,
            stream_diversity: 0,
            mean_frame_len: bytes.len() as f32,
            timing_regularity: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::segment::SampleRef;
    use crate::capture::transponder::TransponderKey;
    use std::collections::HashMap;

    struct MapDemodulator(HashMap<String, Vec<u8>>);

    impl Demodulator for MapDemodulator {
        fn demodulate(&self, segment: &CaptureSegment) -> Option<Vec<u8>> {
            self.0.get(&segment.sample_ref.0).cloned()
        }
    }

    fn segment(reference: &str) -> CaptureSegment {
        CaptureSegment {
            segment_id: "seg-1".into(),
            key: TransponderKey::new("X", 12_500_000, 30_000),
            pass_id: "pass-1".into(),
            start_ts: 0.0,
            end_ts: 5.0,
            sample_rate_hz: 2_000_000.0,
            sample_ref: SampleRef(reference.into()),
            quality: 0.9,
            carrier_to_noise_db: None,
            transponder_meta: None,
        }
    }

    fn fingerprinter_for(reference: &str, bytes: Vec<u8>) -> TransportFingerprinter {
        let mut map = HashMap::new();
        map.insert(reference.to_string(), bytes);
        TransportFingerprinter::new(Arc::new(MapDemodulator(map)))
    }

    #[test]
    fn transport_stream_framing_is_fingerprinted() {
        let mut bytes = Vec::new();
        for packet in 0..24u16 {
            bytes.push(TS_SYNC);
            bytes.push(0x00);
            bytes.push((packet % 20) as u8);
            bytes.push(0x10);
            bytes.extend(std::iter::repeat(0x55u8).take(TS_PACKET_LEN - 4));
        }
        let fingerprinter = fingerprinter_for("cap/ts", bytes);
        let fingerprint = fingerprinter.fingerprint(&segment("cap/ts")).unwrap();
        assert_eq!(fingerprint.framing, TransportFraming::MpegTs);
        assert_eq!(fingerprint.stream_diversity, 20);
        assert_eq!(fingerprint.timing_regularity, 1.0);
    }

    #[test]
    fn periodic_flag_framing_reads_as_hdlc() {
        let mut bytes = Vec::new();
        for frame in 0..32u8 {
            bytes.push(HDLC_FLAG);
            bytes.push(frame % 2);
            bytes.extend(std::iter::repeat(0x11u8).take(30));
        }
        let fingerprinter = fingerprinter_for("cap/hdlc", bytes);
        let fingerprint = fingerprinter.fingerprint(&segment("cap/hdlc")).unwrap();
        assert_eq!(fingerprint.framing, TransportFraming::Hdlc);
        assert_eq!(fingerprint.stream_diversity, 2);
        assert!(fingerprint.timing_regularity > 0.9);
        assert!((fingerprint.mean_frame_len - 32.0).abs() < 0.5);
    }

    #[test]
    fn structureless_bytes_fall_back_to_unknown_framing() {
        let bytes = vec![0x42u8; 512];
        let fingerprinter = fingerprinter_for("cap/none", bytes);
        let fingerprint = fingerprinter.fingerprint(&segment("cap/none")).unwrap();
        assert_eq!(fingerprint.framing, TransportFraming::Unknown);
    }
}

pub mod structure;

pub use structure::ByteStructureProbe;

use crate::capture::segment::CaptureSegment;
use serde::{Deserialize, Serialize};

/// Black-box demodulation capability. Returns the payload byte stream for a
/// segment, or `None` when the physical layer could not be decoded.
pub trait Demodulator: Send + Sync {
    fn demodulate(&self, segment: &CaptureSegment) -> Option<Vec<u8>>;
}

/// What the payload-structure probe concluded about a segment.
///
/// Only structural markers are carried; decoded content never leaves the
/// probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProbeOutcome {
    /// A recognizable encryption handshake or key-exchange header.
    EncryptionHandshake { protocol: String },
    /// Transport framing with scrambling control bits set.
    ScrambledTransport,
    /// Readable, structured plaintext markers.
    StructuredPlaintext {
        marker: String,
        printable_fraction: f32,
        /// Structural hint that personal data may be present (address-like
        /// field patterns). The matched bytes themselves are discarded.
        pii_suspected: bool,
    },
    /// High payload entropy with no encryption markers and no structure.
    HighEntropy,
    Inconclusive,
}

/// Confidence-scored probe result for one segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeReport {
    pub segment_id: String,
    pub outcome: ProbeOutcome,
    pub confidence: f32,
    pub entropy_bits_per_byte: f32,
}

/// Pure capability from segment reference to a labeled probe result.
/// Failures return `None` rather than erroring.
pub trait PayloadProbe: Send + Sync {
    fn probe(&self, segment: &CaptureSegment) -> Option<ProbeReport>;
}

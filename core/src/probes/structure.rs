//! Structural payload probe.
//!
//! Inspects the demodulated byte stream for transport framing, encryption
//! handshake prefixes, scrambling control bits, printable structure, and
//! entropy. Checks run in a fixed order: handshake prefixes, transport
//! scrambling, transport plaintext, bare plaintext, entropy. Every rule is
//! byte-pattern based and documented here so classification stays
//! explainable; payload content is measured, never stored.

use crate::capture::segment::CaptureSegment;
use crate::probes::{Demodulator, PayloadProbe, ProbeOutcome, ProbeReport};
use crate::signal::stats::StatsHelper;
use std::collections::HashSet;
use std::sync::Arc;

const TS_PACKET_LEN: usize = 188;
const TS_SYNC: u8 = 0x47;
const MIN_PAYLOAD: usize = 64;
const HIGH_ENTROPY_BITS: f32 = 7.5;

/// Handshake prefixes recognized at frame starts: TLS and DTLS record
/// headers, SSH banner, IKEv2 SA_INIT marker.
const HANDSHAKE_MAGIC: [(&str, &[u8]); 4] = [
    ("TLS", &[0x16, 0x03]),
    ("DTLS", &[0x16, 0xfe]),
    ("SSH", b"SSH-"),
    ("IKEv2", &[0x21, 0x20, 0x22, 0x08]),
];

struct TransportScan {
    packets: usize,
    scrambled: usize,
    pids: HashSet<u16>,
}

pub struct ByteStructureProbe {
    demodulator: Arc<dyn Demodulator>,
}

impl ByteStructureProbe {
    pub fn new(demodulator: Arc<dyn Demodulator>) -> Self {
        Self { demodulator }
    }

    fn scan_handshake(bytes: &[u8]) -> Option<&'static str> {
        for (protocol, magic) in HANDSHAKE_MAGIC {
            if bytes.starts_with(magic) {
                return Some(protocol);
            }
            // A prefix recurring mid-stream counts once it repeats enough to
            // rule out coincidence.
            let hits = bytes
                .windows(magic.len())
                .filter(|window| *window == magic)
                .count();
            if hits >= 3 {
                return Some(protocol);
            }
        }
        None
    }

    /// Locate MPEG-TS framing (0x47 sync every 188 bytes) and read the
    /// transport_scrambling_control bits and PIDs from each header.
    fn scan_transport(bytes: &[u8]) -> Option<TransportScan> {
        let start = (0..bytes.len().min(TS_PACKET_LEN)).find(|&i| {
            bytes.get(i) == Some(&TS_SYNC)
                && bytes.get(i + TS_PACKET_LEN) == Some(&TS_SYNC)
                && bytes.get(i + 2 * TS_PACKET_LEN) == Some(&TS_SYNC)
        })?;

        let mut scan = TransportScan {
            packets: 0,
            scrambled: 0,
            pids: HashSet::new(),
        };
        let mut offset = start;
        while offset + TS_PACKET_LEN <= bytes.len() {
            if bytes[offset] != TS_SYNC {
                break;
            }
            let header = &bytes[offset..offset + 4];
            let pid = ((header[1] as u16 & 0x1f) << 8) | header[2] as u16;
            let scrambling_control = header[3] >> 6;
            scan.packets += 1;
            scan.pids.insert(pid);
            if scrambling_control != 0 {
                scan.scrambled += 1;
            }
            offset += TS_PACKET_LEN;
        }

        if scan.packets >= 5 {
            Some(scan)
        } else {
            None
        }
    }

    /// Structural PII hint: email-like byte shapes or repeated long digit
    /// runs. Counts patterns only; the matched bytes are discarded.
    fn pii_suspected(bytes: &[u8]) -> bool {
        let email_like = bytes.iter().enumerate().any(|(i, &b)| {
            b == b'@'
                && i > 0
                && bytes[i - 1].is_ascii_alphanumeric()
                && bytes[i + 1..]
                    .iter()
                    .take(24)
                    .any(|&after| after == b'.')
        });
        if email_like {
            return true;
        }

        let mut digit_runs = 0usize;
        let mut run = 0usize;
        for &b in bytes {
            if b.is_ascii_digit() {
                run += 1;
            } else {
                if run >= 6 {
                    digit_runs += 1;
                }
                run = 0;
            }
        }
        if run >= 6 {
            digit_runs += 1;
        }
        digit_runs >= 3
    }

    fn report(
        segment: &CaptureSegment,
        outcome: ProbeOutcome,
        confidence: f32,
        entropy: f32,
    ) -> ProbeReport {
        ProbeReport {
            segment_id: segment.segment_id.clone(),
            outcome,
            confidence: confidence.clamp(0.0, 1.0),
            entropy_bits_per_byte: entropy,
        }
    }
}

impl PayloadProbe for ByteStructureProbe {
    fn probe(&self, segment: &CaptureSegment) -> Option<ProbeReport> {
        let bytes = self.demodulator.demodulate(segment)?;
        let entropy = StatsHelper::shannon_entropy_bits(&bytes);

        if bytes.len() < MIN_PAYLOAD {
            return Some(Self::report(
                segment,
                ProbeOutcome::Inconclusive,
                0.2,
                entropy,
            ));
        }

        if let Some(protocol) = Self::scan_handshake(&bytes) {
            return Some(Self::report(
                segment,
                ProbeOutcome::EncryptionHandshake {
                    protocol: protocol.to_string(),
                },
                0.85,
                entropy,
            ));
        }

        if let Some(scan) = Self::scan_transport(&bytes) {
            let scrambled_fraction = scan.scrambled as f32 / scan.packets as f32;
            if scrambled_fraction > 0.5 {
                return Some(Self::report(
                    segment,
                    ProbeOutcome::ScrambledTransport,
                    0.6 + 0.35 * scrambled_fraction,
                    entropy,
                ));
            }
            // Clear transport framing is structured plaintext even when the
            // payload itself is binary.
            let printable = StatsHelper::printable_fraction(&bytes);
            return Some(Self::report(
                segment,
                ProbeOutcome::StructuredPlaintext {
                    marker: "MPEG-TS clear".to_string(),
                    printable_fraction: printable,
                    pii_suspected: Self::pii_suspected(&bytes),
                },
                0.5 + 0.4 * printable,
                entropy,
            ));
        }

        let printable = StatsHelper::printable_fraction(&bytes);
        if printable > 0.6 {
            return Some(Self::report(
                segment,
                ProbeOutcome::StructuredPlaintext {
                    marker: "ASCII".to_string(),
                    printable_fraction: printable,
                    pii_suspected: Self::pii_suspected(&bytes),
                },
                printable,
                entropy,
            ));
        }

        if entropy >= HIGH_ENTROPY_BITS {
            let confidence = 0.5 + (entropy - HIGH_ENTROPY_BITS) / (8.0 - HIGH_ENTROPY_BITS) * 0.4;
            return Some(Self::report(
                segment,
                ProbeOutcome::HighEntropy,
                confidence,
                entropy,
            ));
        }

        Some(Self::report(
            segment,
            ProbeOutcome::Inconclusive,
            0.2,
            entropy,
        ))
    }
}

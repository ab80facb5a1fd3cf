//! Synthetic capture generation for offline audit runs.
//!
//! Each observation profile produces an IQ block shaped for the modulation
//! identifier plus a demodulated payload stream shaped for the structure
//! probe, so the whole pipeline can be exercised without hardware. The bank
//! keeps generated captures in memory and plays the capture-store role:
//! it resolves sample references and acts as the black-box demodulator.

use anyhow::Context;
use auditcore::capture::{
    CaptureSegment, Polarization, SampleRef, TransponderKey, TransponderMeta,
};
use auditcore::modulation::SampleSource;
use auditcore::probes::Demodulator;
use num_complex::Complex32;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f32::consts::PI;
use std::sync::RwLock;

const TS_PACKET_LEN: usize = 188;
const TS_SYNC: u8 = 0x47;

/// Signal/payload shape of one synthetic observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureProfile {
    /// 8PSK carrier with scrambled transport framing.
    SecureDvbS2,
    /// 8PSK carrier, clear transport, many streams.
    PlaintextDvbS2,
    /// QPSK carrier, clear transport, few streams.
    PlaintextDvbS,
    /// Dense constellation with structureless high-entropy payload.
    ObfuscatedCarrier,
    /// Narrow tone carrying short flag-framed telemetry frames.
    NarrowbandScpc,
    /// No carrier; demodulation fails.
    NoiseFloor,
}

/// Everything needed to synthesize one capture segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationConfig {
    pub satellite: String,
    pub longitude_deg_east: f64,
    pub operator_name: Option<String>,
    pub center_khz: u64,
    pub bandwidth_khz: u64,
    pub profile: CaptureProfile,
    pub segment_id: String,
    pub pass_id: String,
    pub start_ts: f64,
    pub duration_secs: f64,
    pub quality: f32,
    pub sample_count: usize,
    pub seed: u64,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            satellite: "Bangabandhu-1".into(),
            longitude_deg_east: 119.1,
            operator_name: Some("BSCCL (Bangladesh)".into()),
            center_khz: 11_695_000,
            bandwidth_khz: 30_000,
            profile: CaptureProfile::PlaintextDvbS2,
            segment_id: "seg-demo".into(),
            pass_id: "pass-1".into(),
            start_ts: 0.0,
            duration_secs: 5.0,
            quality: 0.9,
            sample_count: 8192,
            seed: 7,
        }
    }
}

impl ObservationConfig {
    pub fn key(&self) -> TransponderKey {
        TransponderKey::new(&self.satellite, self.center_khz, self.bandwidth_khz)
    }
}

struct SyntheticCapture {
    iq: Vec<Complex32>,
    payload: Option<Vec<u8>>,
}

/// In-memory capture store and demodulator for synthetic observations.
pub struct SyntheticCaptureBank {
    captures: RwLock<HashMap<String, SyntheticCapture>>,
}

impl SyntheticCaptureBank {
    pub fn new() -> Self {
        Self {
            captures: RwLock::new(HashMap::new()),
        }
    }

    /// Generate and store a capture, returning the segment describing it.
    pub fn build_segment(&self, config: &ObservationConfig) -> anyhow::Result<CaptureSegment> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let iq = build_iq(config, &mut rng)?;
        let payload = build_payload(config, &mut rng);

        let reference = format!("synthetic/{}", config.segment_id);
        self.captures
            .write()
            .map_err(|_| anyhow::anyhow!("capture bank poisoned"))?
            .insert(reference.clone(), SyntheticCapture { iq, payload });

        Ok(CaptureSegment {
            segment_id: config.segment_id.clone(),
            key: config.key(),
            pass_id: config.pass_id.clone(),
            start_ts: config.start_ts,
            end_ts: config.start_ts + config.duration_secs,
            // Nominal 1.4x oversampling of the transponder bandwidth.
            sample_rate_hz: config.bandwidth_khz as f64 * 1000.0 * 1.4,
            sample_ref: SampleRef(reference),
            quality: config.quality,
            carrier_to_noise_db: Some(3.0 + config.quality * 12.0),
            transponder_meta: Some(TransponderMeta {
                longitude_deg_east: Some(config.longitude_deg_east),
                polarization: Some(Polarization::Horizontal),
                operator_name: config.operator_name.clone(),
                operator_country: None,
            }),
        })
    }
}

impl Default for SyntheticCaptureBank {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for SyntheticCaptureBank {
    fn fetch(&self, sample_ref: &SampleRef) -> Option<Vec<Complex32>> {
        self.captures
            .read()
            .ok()?
            .get(&sample_ref.0)
            .map(|capture| capture.iq.clone())
    }
}

impl Demodulator for SyntheticCaptureBank {
    fn demodulate(&self, segment: &CaptureSegment) -> Option<Vec<u8>> {
        self.captures
            .read()
            .ok()?
            .get(&segment.sample_ref.0)
            .and_then(|capture| capture.payload.clone())
    }
}

/// PSK symbols held for two samples each, with a light noise floor so the
/// spectrum shows a distinct occupied band.
fn psk_carrier(
    sample_count: usize,
    points: usize,
    noise: f32,
    rng: &mut StdRng,
) -> Vec<Complex32> {
    let mut samples = Vec::with_capacity(sample_count);
    let mut symbol = Complex32::new(1.0, 0.0);
    for index in 0..sample_count {
        if index % 2 == 0 {
            let step = rng.gen_range(0..points) as f32;
            let phase = PI / points as f32 + 2.0 * PI * step / points as f32;
            symbol = Complex32::new(phase.cos(), phase.sin());
        }
        let jitter = Complex32::new(
            rng.gen_range(-noise..noise),
            rng.gen_range(-noise..noise),
        );
        samples.push(symbol + jitter);
    }
    samples
}

fn build_iq(config: &ObservationConfig, rng: &mut StdRng) -> anyhow::Result<Vec<Complex32>> {
    let count = config.sample_count;
    if count == 0 {
        anyhow::bail!("observation {} has zero sample count", config.segment_id);
    }

    let samples = match config.profile {
        CaptureProfile::SecureDvbS2 | CaptureProfile::PlaintextDvbS2 => {
            psk_carrier(count, 8, 0.05, rng)
        }
        CaptureProfile::PlaintextDvbS => psk_carrier(count, 4, 0.05, rng),
        CaptureProfile::ObfuscatedCarrier => {
            // Two-ring 16-point constellation.
            let mut samples = Vec::with_capacity(count);
            let mut symbol = Complex32::new(1.0, 0.0);
            for index in 0..count {
                if index % 2 == 0 {
                    let ring = if rng.gen_bool(0.5) { 0.6 } else { 1.2 };
                    let phase = 2.0 * PI * rng.gen_range(0..8) as f32 / 8.0 + PI / 8.0;
                    symbol = Complex32::new(ring * phase.cos(), ring * phase.sin());
                }
                let jitter = Complex32::new(
                    rng.gen_range(-0.04f32..0.04),
                    rng.gen_range(-0.04f32..0.04),
                );
                samples.push(symbol + jitter);
            }
            samples
        }
        CaptureProfile::NarrowbandScpc => {
            // Bin-aligned tone against the planned 1024-point transform.
            let cycles_per_sample = 102.0 / 1024.0;
            (0..count)
                .map(|n| {
                    let phase = 2.0 * PI * cycles_per_sample * n as f32;
                    let jitter = Complex32::new(
                        rng.gen_range(-0.03f32..0.03),
                        rng.gen_range(-0.03f32..0.03),
                    );
                    Complex32::new(phase.cos(), phase.sin()) + jitter
                })
                .collect()
        }
        CaptureProfile::NoiseFloor => (0..count)
            .map(|_| {
                Complex32::new(rng.gen_range(-0.1f32..0.1), rng.gen_range(-0.1f32..0.1))
            })
            .collect(),
    };

    Ok(samples)
}

fn ts_packets(
    count: usize,
    stream_count: usize,
    scrambling: u8,
    mut payload_byte: impl FnMut(usize) -> u8,
) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(count * TS_PACKET_LEN);
    for packet in 0..count {
        let pid = 0x100 + (packet % stream_count.max(1)) as u16;
        bytes.push(TS_SYNC);
        bytes.push((pid >> 8) as u8 & 0x1f);
        bytes.push((pid & 0xff) as u8);
        bytes.push((scrambling << 6) | 0x10);
        for offset in 4..TS_PACKET_LEN {
            bytes.push(payload_byte(packet * TS_PACKET_LEN + offset));
        }
    }
    bytes
}

fn build_payload(config: &ObservationConfig, rng: &mut StdRng) -> Option<Vec<u8>> {
    match config.profile {
        CaptureProfile::SecureDvbS2 => {
            Some(ts_packets(40, 18, 0b10, |_| rng.gen::<u8>()))
        }
        CaptureProfile::PlaintextDvbS2 => {
            let text = b"ROUTE 8802 TRUNK 14 CALL SETUP 0171 4412 885 FRAME OK ";
            Some(ts_packets(40, 18, 0b00, |i| text[i % text.len()]))
        }
        CaptureProfile::PlaintextDvbS => {
            let text = b"vsat billing contact a.karim@example.net account 10449321 node 7 ";
            Some(ts_packets(40, 6, 0b00, |i| text[i % text.len()]))
        }
        CaptureProfile::ObfuscatedCarrier => {
            Some((0..4096).map(|_| rng.gen::<u8>()).collect())
        }
        CaptureProfile::NarrowbandScpc => {
            let text = b"station telemetry poll addr 7 valve 3 temp 41";
            let mut bytes = Vec::new();
            for frame in 0..48u8 {
                bytes.push(0x7e);
                bytes.push(frame % 3);
                bytes.extend_from_slice(&text[..24]);
            }
            Some(bytes)
        }
        CaptureProfile::NoiseFloor => None,
    }
}

/// Demo satellites drawn from the South Asian GEO arc.
const DEMO_CATALOG: [(&str, f64, &str); 5] = [
    ("Bangabandhu-1", 119.1, "BSCCL (Bangladesh)"),
    ("AsiaSat 7", 105.5, "AsiaSat (Hong Kong)"),
    ("GSAT-30", 83.0, "ISRO (India)"),
    ("Thaicom 6", 78.5, "Thaicom (Thailand)"),
    ("MEASAT-3", 91.5, "MEASAT (Malaysia)"),
];

fn observation(
    catalog_index: usize,
    center_khz: u64,
    bandwidth_khz: u64,
    profile: CaptureProfile,
    segment_id: &str,
    pass_id: &str,
    start_ts: f64,
    quality: f32,
    seed: u64,
) -> ObservationConfig {
    let (satellite, longitude, operator) = DEMO_CATALOG[catalog_index];
    ObservationConfig {
        satellite: satellite.into(),
        longitude_deg_east: longitude,
        operator_name: Some(operator.into()),
        center_khz,
        bandwidth_khz,
        profile,
        segment_id: segment_id.into(),
        pass_id: pass_id.into(),
        start_ts,
        quality,
        seed,
        ..ObservationConfig::default()
    }
}

/// The offline demo scenario: one transponder per catalog satellite,
/// covering every profile and both disclosure outcomes.
pub fn demo_observations(base_seed: u64) -> Vec<ObservationConfig> {
    let s = base_seed;
    vec![
        // Unencrypted backhaul over three segments and two passes: opens a
        // disclosure case.
        observation(0, 11_695_000, 30_000, CaptureProfile::PlaintextDvbS2, "bb1-1", "pass-1", 100.0, 0.90, s + 1),
        observation(0, 11_695_000, 30_000, CaptureProfile::PlaintextDvbS2, "bb1-2", "pass-1", 200.0, 0.85, s + 2),
        observation(0, 11_695_000, 30_000, CaptureProfile::PlaintextDvbS2, "bb1-3", "pass-2", 300.0, 0.90, s + 3),
        // Properly scrambled carrier.
        observation(1, 12_661_000, 36_000, CaptureProfile::SecureDvbS2, "as7-1", "pass-1", 110.0, 0.90, s + 4),
        observation(1, 12_661_000, 36_000, CaptureProfile::SecureDvbS2, "as7-2", "pass-1", 210.0, 0.90, s + 5),
        observation(1, 12_661_000, 36_000, CaptureProfile::SecureDvbS2, "as7-3", "pass-2", 310.0, 0.90, s + 6),
        // Non-standard encoding, high entropy.
        observation(2, 11_172_000, 36_000, CaptureProfile::ObfuscatedCarrier, "gs30-1", "pass-1", 120.0, 0.80, s + 7),
        observation(2, 11_172_000, 36_000, CaptureProfile::ObfuscatedCarrier, "gs30-2", "pass-2", 220.0, 0.85, s + 8),
        // Unencrypted telemetry, but only two segments: no case yet.
        observation(3, 12_313_000, 20_000, CaptureProfile::NarrowbandScpc, "tc6-1", "pass-1", 130.0, 0.90, s + 9),
        observation(3, 12_313_000, 20_000, CaptureProfile::NarrowbandScpc, "tc6-2", "pass-2", 230.0, 0.85, s + 10),
        // Second Thaicom transponder: clear VSAT carrier with address-shaped
        // payload fields.
        observation(3, 12_520_000, 30_000, CaptureProfile::PlaintextDvbS, "tc6-3", "pass-1", 150.0, 0.90, s + 11),
        observation(3, 12_520_000, 30_000, CaptureProfile::PlaintextDvbS, "tc6-4", "pass-2", 250.0, 0.85, s + 12),
        // Below the quality floor: rejected, presence only.
        observation(4, 11_602_000, 30_000, CaptureProfile::NoiseFloor, "ms3-1", "pass-1", 140.0, 0.15, s + 13),
    ]
}

/// Build all demo segments against the bank.
pub fn build_segments(
    bank: &SyntheticCaptureBank,
    observations: &[ObservationConfig],
) -> anyhow::Result<Vec<CaptureSegment>> {
    observations
        .iter()
        .map(|config| {
            bank.build_segment(config)
                .with_context(|| format!("building observation {}", config.segment_id))
        })
        .collect()
}

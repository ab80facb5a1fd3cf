use crate::capture::segment::{CaptureSegment, SampleRef};
use crate::signal::fft::FftHelper;
use crate::signal::stats::StatsHelper;
use ndarray::Array2;
use num_complex::Complex32;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Resolves an opaque sample reference to a block of IQ samples.
///
/// Implemented by the capture store collaborator; `None` means the reference
/// could not be read, which the pipeline treats as a rejected segment.
pub trait SampleSource: Send + Sync {
    fn fetch(&self, sample_ref: &SampleRef) -> Option<Vec<Complex32>>;
}

/// Measurable signal features feeding the modulation rule set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalFeatures {
    pub symbol_rate_msps: f32,
    /// Fraction of spectrum bins above the noise floor, in [0, 1].
    pub spectral_occupancy: f32,
    /// Distinct spectral peak groups above the carrier threshold.
    pub spectral_peak_count: usize,
    /// Occupied-cell count of the normalized IQ-plane grid.
    pub constellation_order_hint: usize,
    /// Fraction of samples with envelope above half the RMS level.
    pub envelope_duty_cycle: f32,
    /// Excess kurtosis of the instantaneous amplitude.
    pub amplitude_kurtosis: f32,
}

/// Pure capability turning a segment reference into a feature vector.
///
/// Failures return `None` rather than erroring; a segment without features
/// contributes no evidence.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, segment: &CaptureSegment) -> Option<SignalFeatures>;
}

const MIN_SAMPLES: usize = 256;
const CONSTELLATION_GRID: usize = 9;
const CONSTELLATION_SPAN: f32 = 1.5;

/// Default extractor computing spectral and constellation features from the
/// raw IQ block behind a segment's sample reference.
pub struct SpectralFeatureExtractor {
    samples: Arc<dyn SampleSource>,
    fft: FftHelper,
}

impl SpectralFeatureExtractor {
    pub fn new(samples: Arc<dyn SampleSource>, fft_size: usize) -> Self {
        Self {
            samples,
            fft: FftHelper::new(fft_size.max(64)),
        }
    }

    /// Fraction of bins above the noise floor plus the count of contiguous
    /// peak groups. The floor is the 20th-percentile bin power, which stays
    /// on the noise shelf for carriers occupying up to ~80% of the band.
    fn spectrum_shape(&self, spectrum: &[f32]) -> (f32, usize) {
        let mut sorted: Vec<f32> = spectrum.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let floor = sorted[sorted.len() / 5].max(f32::EPSILON);

        let occupied_threshold = floor * 8.0;
        let peak_threshold = floor * 64.0;
        let occupied = spectrum
            .iter()
            .filter(|&&p| p > occupied_threshold)
            .count();
        let occupancy = occupied as f32 / spectrum.len() as f32;

        // Contiguous runs above the peak threshold count as one carrier each;
        // gaps shorter than 1/64 of the spectrum do not split a run.
        let max_gap = (spectrum.len() / 64).max(1);
        let mut peaks = 0usize;
        let mut gap = max_gap + 1;
        for &p in spectrum {
            if p > peak_threshold {
                if gap > max_gap {
                    peaks += 1;
                }
                gap = 0;
            } else {
                gap += 1;
            }
        }

        (occupancy, peaks)
    }

    fn constellation_hint(iq: &[Complex32], rms: f32) -> usize {
        if rms <= f32::EPSILON {
            return 0;
        }
        let mut grid: Array2<u32> = Array2::zeros((CONSTELLATION_GRID, CONSTELLATION_GRID));
        let scale = CONSTELLATION_GRID as f32 / (2.0 * CONSTELLATION_SPAN);
        for sample in iq {
            let i = ((sample.re / rms + CONSTELLATION_SPAN) * scale) as isize;
            let q = ((sample.im / rms + CONSTELLATION_SPAN) * scale) as isize;
            if (0..CONSTELLATION_GRID as isize).contains(&i)
                && (0..CONSTELLATION_GRID as isize).contains(&q)
            {
                grid[(i as usize, q as usize)] += 1;
            }
        }
        // Cells holding a meaningful share of the samples count as symbol
        // clusters; sparse noise hits do not.
        let floor = (iq.len() as u32 / (CONSTELLATION_GRID * CONSTELLATION_GRID) as u32 / 4).max(2);
        grid.iter().filter(|&&c| c > floor).count()
    }
}

impl FeatureExtractor for SpectralFeatureExtractor {
    fn extract(&self, segment: &CaptureSegment) -> Option<SignalFeatures> {
        let iq = self.samples.fetch(&segment.sample_ref)?;
        if iq.len() < MIN_SAMPLES {
            return None;
        }

        let magnitudes: Vec<f32> = iq.iter().map(|c| c.norm()).collect();
        let rms = StatsHelper::rms(&magnitudes);
        if rms <= f32::EPSILON {
            return None;
        }

        let spectrum = self.fft.power_spectrum(&iq);
        let (occupancy, peaks) = self.spectrum_shape(&spectrum);

        let occupied_hz = occupancy as f64 * segment.sample_rate_hz;
        // Occupied bandwidth over (1 + roll-off), nominal 0.35 roll-off.
        let symbol_rate_msps = (occupied_hz / 1.35 / 1e6) as f32;

        Some(SignalFeatures {
            symbol_rate_msps,
            spectral_occupancy: occupancy,
            spectral_peak_count: peaks,
            constellation_order_hint: Self::constellation_hint(&iq, rms),
            envelope_duty_cycle: StatsHelper::duty_cycle(&magnitudes, 0.5 * rms),
            amplitude_kurtosis: StatsHelper::kurtosis(&magnitudes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::transponder::TransponderKey;
    use std::collections::HashMap;
    use std::f32::consts::PI;

    struct MapSource(HashMap<String, Vec<Complex32>>);

    impl SampleSource for MapSource {
        fn fetch(&self, sample_ref: &SampleRef) -> Option<Vec<Complex32>> {
            self.0.get(&sample_ref.0).cloned()
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

    fn qpsk_block(len: usize) -> Vec<Complex32> {
        (0..len)
            .map(|i| {
                let phase = PI / 4.0 + PI / 2.0 * ((i * 7 + i / 3) % 4) as f32;
                Complex32::new(phase.cos(), phase.sin())
            })
            .collect()
    }

    fn extractor_for(reference: &str, iq: Vec<Complex32>) -> SpectralFeatureExtractor {
        let mut map = HashMap::new();
        map.insert(reference.to_string(), iq);
        SpectralFeatureExtractor::new(Arc::new(MapSource(map)), 1024)
    }

    #[test]
    fn unknown_reference_yields_no_features() {
        let extractor = extractor_for("cap/other", qpsk_block(2048));
        assert!(extractor.extract(&segment("cap/missing")).is_none());
    }

    #[test]
    fn short_block_yields_no_features() {
        let extractor = extractor_for("cap/short", qpsk_block(32));
        assert!(extractor.extract(&segment("cap/short")).is_none());
    }

    #[test]
    fn qpsk_block_shows_four_clusters_and_full_envelope() {
        let extractor = extractor_for("cap/qpsk", qpsk_block(4096));
        let features = extractor.extract(&segment("cap/qpsk")).unwrap();
        assert_eq!(features.constellation_order_hint, 4);
        assert!(features.envelope_duty_cycle > 0.95);
    }

    #[test]
    fn bursty_envelope_lowers_duty_cycle() {
        let iq: Vec<Complex32> = (0..4096)
            .map(|i| {
                if (i / 512) % 2 == 0 {
                    Complex32::new(1.0, 0.0)
                } else {
                    Complex32::new(0.0, 0.0)
                }
            })
            .collect();
        let extractor = extractor_for("cap/burst", iq);
        let features = extractor.extract(&segment("cap/burst")).unwrap();
        assert!(features.envelope_duty_cycle < 0.7);
    }
}

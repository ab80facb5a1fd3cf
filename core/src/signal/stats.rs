pub struct StatsHelper;

impl StatsHelper {
    pub fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|&v| v * v).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }

    /// Shannon entropy of a byte sequence in bits per byte, in [0, 8].
    pub fn shannon_entropy_bits(bytes: &[u8]) -> f32 {
        if bytes.is_empty() {
            return 0.0;
        }
        let mut counts = [0usize; 256];
        for &b in bytes {
            counts[b as usize] += 1;
        }
        let total = bytes.len() as f32;
        counts
            .iter()
            .filter(|&&c| c > 0)
            .map(|&c| {
                let p = c as f32 / total;
                -p * p.log2()
            })
            .sum()
    }

    /// Fraction of bytes in the printable ASCII range (space through tilde,
    /// plus tab/newline/carriage return).
    pub fn printable_fraction(bytes: &[u8]) -> f32 {
        if bytes.is_empty() {
            return 0.0;
        }
        let printable = bytes
            .iter()
            .filter(|&&b| (0x20..=0x7e).contains(&b) || b == b'\t' || b == b'\n' || b == b'\r')
            .count();
        printable as f32 / bytes.len() as f32
    }

    /// Excess kurtosis of a sequence; 0 for a Gaussian envelope.
    pub fn kurtosis(values: &[f32]) -> f32 {
        if values.len() < 2 {
            return 0.0;
        }
        let n = values.len() as f32;
        let mean = values.iter().sum::<f32>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
        if variance <= f32::EPSILON {
            return 0.0;
        }
        let fourth = values.iter().map(|v| (v - mean).powi(4)).sum::<f32>() / n;
        fourth / (variance * variance) - 3.0
    }

    /// Fraction of samples whose magnitude exceeds `threshold`.
    pub fn duty_cycle(magnitudes: &[f32], threshold: f32) -> f32 {
        if magnitudes.is_empty() {
            return 0.0;
        }
        let active = magnitudes.iter().filter(|&&m| m > threshold).count();
        active as f32 / magnitudes.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_zero_sequence_yields_zero() {
        assert_eq!(StatsHelper::rms(&[]), 0.0);
        assert_eq!(StatsHelper::rms(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn rms_handles_single_value() {
        assert_eq!(StatsHelper::rms(&[4.0]), 4.0);
    }

    #[test]
    fn entropy_of_constant_bytes_is_zero() {
        assert_eq!(StatsHelper::shannon_entropy_bits(&[0x47; 512]), 0.0);
    }

    #[test]
    fn entropy_of_uniform_bytes_approaches_eight() {
        let bytes: Vec<u8> = (0..=255).cycle().take(4096).collect();
        assert!(StatsHelper::shannon_entropy_bits(&bytes) > 7.9);
    }

    #[test]
    fn printable_fraction_of_ascii_text_is_high() {
        let text = b"MPEG transport stream carrying readable headers\n";
        assert!(StatsHelper::printable_fraction(text) > 0.95);
        assert!(StatsHelper::printable_fraction(&[0x00, 0x01, 0x02, 0x03]) < 0.01);
    }

    #[test]
    fn duty_cycle_counts_active_fraction() {
        let mags = [0.0, 1.0, 1.0, 0.0];
        assert_eq!(StatsHelper::duty_cycle(&mags, 0.5), 0.5);
    }
}

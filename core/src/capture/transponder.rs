use serde::{Deserialize, Serialize};

/// Stable identity of a satellite downlink channel.
///
/// Frequencies are carried as integer kHz so the key is exact and hashable;
/// a transponder keeps the same key across observation sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransponderKey {
    pub satellite: String,
    pub center_khz: u64,
    pub bandwidth_khz: u64,
}

impl TransponderKey {
    pub fn new(satellite: &str, center_khz: u64, bandwidth_khz: u64) -> Self {
        Self {
            satellite: satellite.to_string(),
            center_khz,
            bandwidth_khz,
        }
    }

    pub fn center_mhz(&self) -> f64 {
        self.center_khz as f64 / 1000.0
    }

    pub fn bandwidth_mhz(&self) -> f64 {
        self.bandwidth_khz as f64 / 1000.0
    }
}

impl std::fmt::Display for TransponderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} @ {:.3} MHz / {:.3} MHz",
            self.satellite,
            self.center_mhz(),
            self.bandwidth_mhz()
        )
    }
}

/// Downlink polarization as reported by the capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarization {
    Horizontal,
    Vertical,
    Lhcp,
    Rhcp,
}

/// How deeply a transponder has been analyzed so far.
///
/// Carried per record rather than as a process-wide flag so different
/// transponders can be in different phases concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisDepth {
    BroadbandScan,
    DeepDive,
}

/// Optional descriptive metadata delivered with a segment, applied when the
/// transponder is first observed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransponderMeta {
    pub longitude_deg_east: Option<f64>,
    pub polarization: Option<Polarization>,
    pub operator_name: Option<String>,
    pub operator_country: Option<String>,
}

/// An identified downlink channel and its presence history.
///
/// Created on first observation and never deleted. The last-observed
/// timestamp updates even for segments rejected at ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transponder {
    pub key: TransponderKey,
    pub longitude_deg_east: Option<f64>,
    pub polarization: Option<Polarization>,
    pub operator_name: Option<String>,
    pub operator_country: Option<String>,
    pub first_observed: f64,
    pub last_observed: f64,
}

impl Transponder {
    pub fn first_seen(key: TransponderKey, meta: Option<&TransponderMeta>, timestamp: f64) -> Self {
        let meta = meta.cloned().unwrap_or_default();
        Self {
            key,
            longitude_deg_east: meta.longitude_deg_east,
            polarization: meta.polarization,
            operator_name: meta.operator_name,
            operator_country: meta.operator_country,
            first_observed: timestamp,
            last_observed: timestamp,
        }
    }

    /// Presence tracking is independent of classification; rejected segments
    /// still advance `last_observed`.
    pub fn touch(&mut self, timestamp: f64) {
        if timestamp > self.last_observed {
            self.last_observed = timestamp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_displays_in_megahertz() {
        let key = TransponderKey::new("X", 12_500_000, 30_000);
        assert_eq!(format!("{}", key), "X @ 12500.000 MHz / 30.000 MHz");
    }

    #[test]
    fn identical_tuples_share_a_key() {
        let a = TransponderKey::new("AsiaSat 7", 12_345_678, 36_000);
        let b = TransponderKey::new("AsiaSat 7", 12_345_678, 36_000);
        assert_eq!(a, b);
    }

    #[test]
    fn touch_never_moves_last_observed_backwards() {
        let key = TransponderKey::new("X", 12_500_000, 30_000);
        let mut transponder = Transponder::first_seen(key, None, 100.0);
        transponder.touch(90.0);
        assert_eq!(transponder.last_observed, 100.0);
        transponder.touch(140.0);
        assert_eq!(transponder.last_observed, 140.0);
        assert_eq!(transponder.first_observed, 100.0);
    }
}

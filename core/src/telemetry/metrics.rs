use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Point-in-time counter values, serializable for the stats export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub processed: usize,
    pub rejected: usize,
    pub duplicates: usize,
    pub probe_failures: usize,
    pub contention_retries: usize,
    pub cases_opened: usize,
    pub cases_closed: usize,
}

/// Shared counter block for the pipeline. Rejected segments and duplicate
/// deliveries are tracked separately from processed evidence so the reject
/// statistics stay audit-grade.
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    fn bump(&self, update: impl FnOnce(&mut MetricsSnapshot)) {
        if let Ok(mut metrics) = self.inner.lock() {
            update(&mut metrics);
        }
    }

    pub fn record_processed(&self) {
        self.bump(|m| m.processed += 1);
    }

    pub fn record_rejected(&self) {
        self.bump(|m| m.rejected += 1);
    }

    pub fn record_duplicate(&self) {
        self.bump(|m| m.duplicates += 1);
    }

    pub fn record_probe_failure(&self) {
        self.bump(|m| m.probe_failures += 1);
    }

    pub fn record_contention_retry(&self) {
        self.bump(|m| m.contention_retries += 1);
    }

    pub fn record_case_opened(&self) {
        self.bump(|m| m.cases_opened += 1);
    }

    pub fn record_case_closed(&self) {
        self.bump(|m| m.cases_closed += 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|m| *m).unwrap_or_default()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let metrics = MetricsRecorder::new();
        metrics.record_processed();
        metrics.record_processed();
        metrics.record_rejected();
        metrics.record_duplicate();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.duplicates, 1);
        assert_eq!(snapshot.cases_opened, 0);
    }
}

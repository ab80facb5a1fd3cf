use crate::capture::transponder::TransponderKey;
use crate::disclosure::case::{CaseStatus, DisclosureCase};
use crate::telemetry::log::LogManager;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Emitted on every case state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseEvent {
    pub case_id: String,
    pub key: TransponderKey,
    pub status: CaseStatus,
    pub timestamp: f64,
}

/// Collaborator receiving case state changes. The tracker never composes
/// notification content itself.
pub trait NotificationSink: Send + Sync {
    fn case_changed(&self, event: &CaseEvent);
}

/// Default sink that records events to the log stream.
pub struct LogNotificationSink {
    logger: LogManager,
}

impl LogNotificationSink {
    pub fn new() -> Self {
        Self {
            logger: LogManager::new(),
        }
    }
}

impl Default for LogNotificationSink {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for LogNotificationSink {
    fn case_changed(&self, event: &CaseEvent) {
        self.logger.record(&format!(
            "disclosure {} ({}) -> {}",
            event.case_id, event.key, event.status
        ));
    }
}

/// Tracks disclosure cases per transponder: one open case at a time, full
/// case history retained, automatic close on timeout.
pub struct DisclosureTracker {
    cases: Mutex<HashMap<TransponderKey, Vec<DisclosureCase>>>,
    sink: std::sync::Arc<dyn NotificationSink>,
    timeout_secs: f64,
}

impl DisclosureTracker {
    pub fn new(timeout_secs: f64, sink: std::sync::Arc<dyn NotificationSink>) -> Self {
        Self {
            cases: Mutex::new(HashMap::new()),
            sink,
            timeout_secs,
        }
    }

    fn emit(&self, case: &DisclosureCase, timestamp: f64) -> CaseEvent {
        let event = CaseEvent {
            case_id: case.case_id.clone(),
            key: case.key.clone(),
            status: case.status,
            timestamp,
        };
        self.sink.case_changed(&event);
        event
    }

    /// Open a new case unless one is already open for the key. Closed cases
    /// never suppress a re-opening.
    pub fn open_case(&self, key: &TransponderKey, now: f64) -> Option<DisclosureCase> {
        let mut cases = self.cases.lock().ok()?;
        let history = cases.entry(key.clone()).or_default();
        if history.iter().any(|case| case.is_open()) {
            return None;
        }
        let case = DisclosureCase::open(key.clone(), history.len() + 1, now);
        history.push(case.clone());
        drop(cases);
        self.emit(&case, now);
        Some(case)
    }

    fn transition(
        &self,
        key: &TransponderKey,
        now: f64,
        apply: impl FnOnce(&mut DisclosureCase) -> bool,
    ) -> Option<DisclosureCase> {
        let mut cases = self.cases.lock().ok()?;
        let case = cases
            .get_mut(key)?
            .iter_mut()
            .find(|case| case.is_open())?;
        if !apply(case) {
            return None;
        }
        let updated = case.clone();
        drop(cases);
        self.emit(&updated, now);
        Some(updated)
    }

    /// Operator-driven transitions.
    pub fn mark_notified(&self, key: &TransponderKey, now: f64) -> Option<DisclosureCase> {
        self.transition(key, now, |case| {
            if case.status != CaseStatus::Pending {
                return false;
            }
            case.status = CaseStatus::Notified;
            case.notified_ts = Some(now);
            true
        })
    }

    pub fn mark_acknowledged(&self, key: &TransponderKey, now: f64) -> Option<DisclosureCase> {
        self.transition(key, now, |case| {
            if !matches!(case.status, CaseStatus::Pending | CaseStatus::Notified) {
                return false;
            }
            case.status = CaseStatus::Acknowledged;
            case.acknowledged_ts = Some(now);
            true
        })
    }

    pub fn mark_remediated(&self, key: &TransponderKey, now: f64) -> Option<DisclosureCase> {
        self.transition(key, now, |case| {
            case.status = CaseStatus::Remediated;
            case.closed_ts = Some(now);
            true
        })
    }

    /// Close unacknowledged cases past the timeout. Each case closes exactly
    /// once; repeated sweeps are idempotent.
    pub fn sweep(&self, now: f64) -> Vec<CaseEvent> {
        let mut closed = Vec::new();
        if let Ok(mut cases) = self.cases.lock() {
            for history in cases.values_mut() {
                for case in history.iter_mut() {
                    if case.timed_out(now, self.timeout_secs) {
                        case.status = CaseStatus::ClosedNoResponse;
                        case.closed_ts = Some(now);
                        closed.push(case.clone());
                    }
                }
            }
        }
        closed
            .iter()
            .map(|case| self.emit(case, now))
            .collect()
    }

    pub fn open_case_for(&self, key: &TransponderKey) -> Option<DisclosureCase> {
        self.cases
            .lock()
            .ok()?
            .get(key)?
            .iter()
            .find(|case| case.is_open())
            .cloned()
    }

    pub fn cases_for(&self, key: &TransponderKey) -> Vec<DisclosureCase> {
        self.cases
            .lock()
            .ok()
            .and_then(|cases| cases.get(key).cloned())
            .unwrap_or_default()
    }

    pub fn all_cases(&self) -> Vec<DisclosureCase> {
        self.cases
            .lock()
            .map(|cases| cases.values().flatten().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    struct RecordingSink(StdMutex<Vec<CaseEvent>>);

    impl NotificationSink for RecordingSink {
        fn case_changed(&self, event: &CaseEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    fn key() -> TransponderKey {
        TransponderKey::new("X", 12_500_000, 30_000)
    }

    fn tracker_with_sink(timeout: f64) -> (DisclosureTracker, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink(StdMutex::new(Vec::new())));
        (DisclosureTracker::new(timeout, sink.clone()), sink)
    }

    #[test]
    fn only_one_case_open_at_a_time() {
        let (tracker, _) = tracker_with_sink(1000.0);
        assert!(tracker.open_case(&key(), 10.0).is_some());
        assert!(tracker.open_case(&key(), 20.0).is_none());
    }

    #[test]
    fn lifecycle_transitions_emit_events() {
        let (tracker, sink) = tracker_with_sink(1000.0);
        tracker.open_case(&key(), 10.0).unwrap();
        tracker.mark_notified(&key(), 20.0).unwrap();
        tracker.mark_acknowledged(&key(), 30.0).unwrap();
        tracker.mark_remediated(&key(), 40.0).unwrap();

        let statuses: Vec<CaseStatus> =
            sink.0.lock().unwrap().iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                CaseStatus::Pending,
                CaseStatus::Notified,
                CaseStatus::Acknowledged,
                CaseStatus::Remediated
            ]
        );
    }

    #[test]
    fn notify_requires_a_pending_case() {
        let (tracker, _) = tracker_with_sink(1000.0);
        tracker.open_case(&key(), 10.0).unwrap();
        tracker.mark_acknowledged(&key(), 20.0).unwrap();
        assert!(tracker.mark_notified(&key(), 30.0).is_none());
    }

    #[test]
    fn timeout_sweep_closes_exactly_once() {
        let timeout = 90.0 * 24.0 * 3600.0;
        let (tracker, _) = tracker_with_sink(timeout);
        tracker.open_case(&key(), 0.0).unwrap();

        assert!(tracker.sweep(timeout - 1.0).is_empty());

        let closed = tracker.sweep(timeout + 1.0);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].status, CaseStatus::ClosedNoResponse);

        // Idempotent: a second sweep closes nothing further.
        assert!(tracker.sweep(timeout + 2.0).is_empty());
    }

    #[test]
    fn renewed_evidence_reopens_after_close() {
        let (tracker, _) = tracker_with_sink(100.0);
        tracker.open_case(&key(), 0.0).unwrap();
        tracker.sweep(200.0);

        let reopened = tracker.open_case(&key(), 300.0).unwrap();
        assert_eq!(reopened.status, CaseStatus::Pending);
        assert_eq!(tracker.cases_for(&key()).len(), 2);
        assert_eq!(reopened.case_id, "case-X-12500000-2");
    }

    #[test]
    fn remediation_closes_without_timeout() {
        let (tracker, _) = tracker_with_sink(100.0);
        tracker.open_case(&key(), 0.0).unwrap();
        tracker.mark_remediated(&key(), 10.0).unwrap();
        assert!(tracker.open_case_for(&key()).is_none());
        assert!(tracker.sweep(500.0).is_empty());
    }
}

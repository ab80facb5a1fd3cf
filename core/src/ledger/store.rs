//! Append-only, deduplicating classification store.
//!
//! Evidence for one transponder folds under that key's own async mutex, so
//! unrelated transponders proceed concurrently while per-key updates stay
//! serialized. Segment ids already folded are ignored (at-most-once
//! accounting under retry or redelivery). Lock acquisition is bounded:
//! exhausting the retry budget surfaces `PipelineError::LedgerContention`
//! rather than blocking forever.

use crate::capture::segment::CaptureSegment;
use crate::capture::transponder::{AnalysisDepth, Transponder, TransponderKey, TransponderMeta};
use crate::classify::engine::{self, EvidenceTally, SegmentEvidence};
use crate::classify::verdict::Verdict;
use crate::ledger::record::{ClassificationRecord, HistoryEntry, HistoryEvent};
use crate::ledger::snapshot::{AuditSnapshot, TransponderSnapshot};
use crate::prelude::{PipelineConfig, PipelineError, PipelineResult};
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::MetricsRecorder;
use crate::traffic::categorizer::CategoryDecision;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

struct LedgerEntry {
    transponder: Transponder,
    record: Option<ClassificationRecord>,
    history: Vec<HistoryEntry>,
    consumed: HashSet<String>,
    passes: HashSet<String>,
    tally: EvidenceTally,
}

impl LedgerEntry {
    fn new(key: TransponderKey, meta: Option<&TransponderMeta>, timestamp: f64) -> Self {
        Self {
            transponder: Transponder::first_seen(key, meta, timestamp),
            record: None,
            history: Vec::new(),
            consumed: HashSet::new(),
            passes: HashSet::new(),
            tally: EvidenceTally::default(),
        }
    }

    fn disclosure_eligible(&self, config: &PipelineConfig) -> bool {
        match self.record.as_ref() {
            Some(record) => engine::disclosure_eligible(
                record.verdict,
                record.evidence_count,
                self.passes.len(),
                config,
            ),
            None => false,
        }
    }
}

/// Result of folding a segment's evidence.
#[derive(Debug, Clone)]
pub enum FoldOutcome {
    Folded {
        record: ClassificationRecord,
        verdict_changed: bool,
        disclosure_eligible: bool,
    },
    /// The segment had already been folded; nothing changed.
    Duplicate,
}

pub struct AuditLedger {
    entries: RwLock<HashMap<TransponderKey, Arc<Mutex<LedgerEntry>>>>,
    config: PipelineConfig,
    metrics: Arc<MetricsRecorder>,
    logger: LogManager,
}

impl AuditLedger {
    pub fn new(config: PipelineConfig, metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
            metrics,
            logger: LogManager::new(),
        }
    }

    fn entry(
        &self,
        key: &TransponderKey,
        meta: Option<&TransponderMeta>,
        timestamp: f64,
    ) -> PipelineResult<Arc<Mutex<LedgerEntry>>> {
        if let Some(entry) = self
            .entries
            .read()
            .map_err(|_| PipelineError::Internal("ledger map poisoned".into()))?
            .get(key)
        {
            return Ok(entry.clone());
        }

        let mut entries = self
            .entries
            .write()
            .map_err(|_| PipelineError::Internal("ledger map poisoned".into()))?;
        Ok(entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(LedgerEntry::new(key.clone(), meta, timestamp))))
            .clone())
    }

    /// Bounded try-lock with linear backoff. Exhausting the budget is an
    /// operational error; it indicates a concurrency-control bug, not
    /// normal contention.
    async fn lock_entry(
        &self,
        key: &TransponderKey,
        entry: Arc<Mutex<LedgerEntry>>,
    ) -> PipelineResult<OwnedMutexGuard<LedgerEntry>> {
        for attempt in 0..self.config.contention_retry_budget {
            match entry.clone().try_lock_owned() {
                Ok(guard) => return Ok(guard),
                Err(_) => {
                    self.metrics.record_contention_retry();
                    let backoff = self.config.contention_backoff_ms * (attempt as u64 + 1);
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
            }
        }
        Err(PipelineError::LedgerContention(format!(
            "retry budget exhausted for {}",
            key
        )))
    }

    /// Presence tracking for rejected segments: touches (or creates) the
    /// transponder without creating a classification record.
    pub async fn observe_presence(&self, segment: &CaptureSegment) -> PipelineResult<()> {
        let entry = self.entry(
            &segment.key,
            segment.transponder_meta.as_ref(),
            segment.end_ts,
        )?;
        let mut guard = self.lock_entry(&segment.key, entry).await?;
        guard.transponder.touch(segment.end_ts);
        Ok(())
    }

    /// Fold one segment's evidence into the transponder's record.
    /// Idempotent per segment id.
    pub async fn upsert(
        &self,
        segment: &CaptureSegment,
        evidence: SegmentEvidence,
    ) -> PipelineResult<FoldOutcome> {
        let entry = self.entry(
            &segment.key,
            segment.transponder_meta.as_ref(),
            segment.end_ts,
        )?;
        let mut guard = self.lock_entry(&segment.key, entry).await?;

        if guard.consumed.contains(&evidence.segment_id) {
            debug!(
                "duplicate evidence {} for {} ignored",
                evidence.segment_id, segment.key
            );
            self.metrics.record_duplicate();
            return Ok(FoldOutcome::Duplicate);
        }

        guard.transponder.touch(segment.end_ts);
        guard.consumed.insert(evidence.segment_id.clone());
        guard.passes.insert(evidence.pass_id.clone());

        let entry = &mut *guard;
        let decision = engine::fold(&mut entry.tally, &evidence, &self.config);
        let record = entry
            .record
            .get_or_insert_with(|| ClassificationRecord::new(segment.key.clone(), segment.end_ts));

        let prior = record.verdict;
        record.evidence_count += 1;
        record.last_updated = segment.end_ts;
        record.confidence = decision.confidence;
        record.pii_flagged |= decision.pii_suspected;

        let verdict_changed = prior != decision.verdict;
        if verdict_changed {
            entry.history.push(HistoryEntry {
                timestamp: segment.end_ts,
                event: HistoryEvent::VerdictChange {
                    from: prior,
                    to: decision.verdict,
                },
                confidence: decision.confidence,
                evidence_count: record.evidence_count,
                segment_id: evidence.segment_id.clone(),
            });
            record.verdict = decision.verdict;
            self.logger.record(&format!(
                "{} verdict {} -> {} ({} segments)",
                segment.key,
                prior,
                decision.verdict,
                record.evidence_count
            ));
        }

        // Anything short of a stable SECURE reading warrants the deep-dive
        // phase for this transponder.
        if matches!(record.verdict, Verdict::Unencrypted | Verdict::FurtherAnalysis) {
            record.analysis_depth = AnalysisDepth::DeepDive;
        }

        let record = record.clone();
        let disclosure_eligible = entry.disclosure_eligible(&self.config);
        Ok(FoldOutcome::Folded {
            record,
            verdict_changed,
            disclosure_eligible,
        })
    }

    /// Apply a traffic-category decision to an unencrypted transponder.
    /// Revisions append to history alongside verdict changes.
    pub async fn update_category(
        &self,
        key: &TransponderKey,
        decision: &CategoryDecision,
        timestamp: f64,
        segment_id: &str,
    ) -> PipelineResult<Option<ClassificationRecord>> {
        let entry = match self.lookup(key) {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let mut guard = self.lock_entry(key, entry).await?;

        let entry = &mut *guard;
        let record = match entry.record.as_mut() {
            Some(record) if record.verdict == Verdict::Unencrypted => record,
            _ => return Ok(None),
        };

        if record.traffic_category != Some(decision.category) {
            entry.history.push(HistoryEntry {
                timestamp,
                event: HistoryEvent::CategoryChange {
                    from: record.traffic_category,
                    to: decision.category,
                },
                confidence: decision.confidence,
                evidence_count: record.evidence_count,
                segment_id: segment_id.to_string(),
            });
            record.traffic_category = Some(decision.category);
            record.last_updated = timestamp;
        }

        Ok(Some(record.clone()))
    }

    fn lookup(&self, key: &TransponderKey) -> Option<Arc<Mutex<LedgerEntry>>> {
        self.entries.read().ok()?.get(key).cloned()
    }

    pub async fn current_record(&self, key: &TransponderKey) -> Option<ClassificationRecord> {
        let entry = self.lookup(key)?;
        let guard = entry.lock().await;
        guard.record.clone()
    }

    /// Ordered, append-only verdict and category history for a key.
    pub async fn history(&self, key: &TransponderKey) -> Vec<HistoryEntry> {
        match self.lookup(key) {
            Some(entry) => entry.lock().await.history.clone(),
            None => Vec::new(),
        }
    }

    pub async fn transponder(&self, key: &TransponderKey) -> Option<Transponder> {
        let entry = self.lookup(key)?;
        let guard = entry.lock().await;
        Some(guard.transponder.clone())
    }

    /// Read-only export of current records, history, and per-satellite
    /// statistics.
    pub async fn snapshot(&self, generated_at: f64) -> AuditSnapshot {
        let entries: Vec<Arc<Mutex<LedgerEntry>>> = match self.entries.read() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => Vec::new(),
        };

        let mut transponders = Vec::with_capacity(entries.len());
        for entry in entries {
            let guard = entry.lock().await;
            transponders.push(TransponderSnapshot {
                transponder: guard.transponder.clone(),
                record: guard.record.clone(),
                history: guard.history.clone(),
                disclosure_eligible: guard.disclosure_eligible(&self.config),
            });
        }

        AuditSnapshot::compile(generated_at, transponders)
    }

    #[cfg(test)]
    fn entry_arc(&self, key: &TransponderKey) -> Option<Arc<Mutex<LedgerEntry>>> {
        self.lookup(key)
    }
}

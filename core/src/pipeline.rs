//! End-to-end wiring of the classification stages.
//!
//! Segments flow strictly left to right: ingest admission, modulation
//! identification, payload probing, evidence folding in the ledger, traffic
//! categorization for unencrypted transponders, then disclosure tracking.
//! One bad segment never halts processing of others: admission failures and
//! unreadable captures surface as reported rejections, not errors.

use crate::capture::ingest::{Admission, IngestStage, RejectReason};
use crate::capture::segment::CaptureSegment;
use crate::classify::engine::SegmentEvidence;
use crate::classify::verdict::Verdict;
use crate::disclosure::case::DisclosureCase;
use crate::disclosure::tracker::{CaseEvent, DisclosureTracker, NotificationSink};
use crate::ledger::record::ClassificationRecord;
use crate::ledger::store::{AuditLedger, FoldOutcome};
use crate::modulation::features::FeatureExtractor;
use crate::modulation::identifier::ModulationIdentifier;
use crate::prelude::{PipelineConfig, PipelineResult, PipelineStage};
use crate::probes::PayloadProbe;
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::MetricsRecorder;
use crate::traffic::categorizer;
use crate::traffic::fingerprint::TrafficFingerprinter;
use std::sync::Arc;

/// What became of one delivered segment.
#[derive(Debug, Clone)]
pub enum SegmentOutcome {
    Rejected {
        reason: RejectReason,
    },
    /// Redelivery of an already-folded segment; ledger state unchanged.
    Duplicate,
    Classified {
        record: ClassificationRecord,
        /// Set when this segment's evidence opened a disclosure case.
        case: Option<DisclosureCase>,
    },
}

pub struct TransponderPipeline {
    config: PipelineConfig,
    ledger: Arc<AuditLedger>,
    tracker: Arc<DisclosureTracker>,
    extractor: Arc<dyn FeatureExtractor>,
    probe: Arc<dyn PayloadProbe>,
    fingerprinter: Arc<dyn TrafficFingerprinter>,
    metrics: Arc<MetricsRecorder>,
    logger: LogManager,
}

impl TransponderPipeline {
    pub fn new(
        config: PipelineConfig,
        extractor: Arc<dyn FeatureExtractor>,
        probe: Arc<dyn PayloadProbe>,
        fingerprinter: Arc<dyn TrafficFingerprinter>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let metrics = Arc::new(MetricsRecorder::new());
        let ledger = Arc::new(AuditLedger::new(config.clone(), metrics.clone()));
        let tracker = Arc::new(DisclosureTracker::new(config.disclosure_timeout_secs, sink));
        Self {
            config,
            ledger,
            tracker,
            extractor,
            probe,
            fingerprinter,
            metrics,
            logger: LogManager::scoped("pipeline"),
        }
    }

    pub fn ledger(&self) -> &Arc<AuditLedger> {
        &self.ledger
    }

    pub fn tracker(&self) -> &Arc<DisclosureTracker> {
        &self.tracker
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    async fn reject(
        &self,
        segment: &CaptureSegment,
        reason: RejectReason,
    ) -> PipelineResult<SegmentOutcome> {
        // Presence tracking is independent of classification.
        self.ledger.observe_presence(segment).await?;
        self.metrics.record_rejected();
        self.logger.record(&format!(
            "LOW_QUALITY {} ({}): {}",
            segment.segment_id, segment.key, reason
        ));
        Ok(SegmentOutcome::Rejected { reason })
    }

    /// Run one segment through the full pipeline.
    pub async fn process_segment(&self, segment: CaptureSegment) -> PipelineResult<SegmentOutcome> {
        let mut ingest = IngestStage::new();
        ingest.initialize(&self.config)?;
        let admission = ingest.execute(segment)?;
        ingest.cleanup();

        let segment = match admission {
            Admission::Admitted(segment) => segment,
            Admission::Rejected { segment, reason } => {
                return self.reject(&segment, reason).await;
            }
        };

        let mut identifier = ModulationIdentifier::new(self.extractor.clone());
        identifier.initialize(&self.config)?;
        let modulation = identifier.execute(segment.clone())?;
        identifier.cleanup();

        let modulation = match modulation {
            Some(modulation) => modulation,
            None => return self.reject(&segment, RejectReason::Unreadable).await,
        };

        let probe = self.probe.probe(&segment);
        if probe.is_none() {
            self.metrics.record_probe_failure();
        }

        let evidence = SegmentEvidence {
            segment_id: segment.segment_id.clone(),
            pass_id: segment.pass_id.clone(),
            timestamp: segment.end_ts,
            quality: segment.quality,
            modulation,
            probe,
        };

        let (mut record, disclosure_eligible) =
            match self.ledger.upsert(&segment, evidence).await? {
                FoldOutcome::Duplicate => return Ok(SegmentOutcome::Duplicate),
                FoldOutcome::Folded {
                    record,
                    disclosure_eligible,
                    ..
                } => (record, disclosure_eligible),
            };

        // Traffic categorization runs only on currently unencrypted
        // transponders, and re-runs on every new evidence batch.
        if record.verdict == Verdict::Unencrypted {
            if let Some(fingerprint) = self.fingerprinter.fingerprint(&segment) {
                let decision = categorizer::categorize(&fingerprint);
                if let Some(updated) = self
                    .ledger
                    .update_category(&segment.key, &decision, segment.end_ts, &segment.segment_id)
                    .await?
                {
                    record = updated;
                }
            }
        }

        let mut case = None;
        if disclosure_eligible {
            if let Some(opened) = self.tracker.open_case(&segment.key, segment.end_ts) {
                self.metrics.record_case_opened();
                case = Some(opened);
            }
        }

        self.metrics.record_processed();
        Ok(SegmentOutcome::Classified { record, case })
    }

    /// Auto-close unacknowledged disclosure cases past the timeout.
    pub fn sweep_disclosures(&self, now: f64) -> Vec<CaseEvent> {
        let events = self.tracker.sweep(now);
        for _ in &events {
            self.metrics.record_case_closed();
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::segment::SampleRef;
    use crate::capture::transponder::TransponderKey;
    use crate::disclosure::case::CaseStatus;
    use crate::disclosure::tracker::LogNotificationSink;
    use crate::modulation::features::SignalFeatures;
    use crate::probes::{ProbeOutcome, ProbeReport};
    use crate::traffic::fingerprint::{TrafficFingerprint, TransportFraming};
    use crate::traffic::TrafficCategory;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const DAY_SECS: f64 = 24.0 * 3600.0;

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("building test runtime")
            .block_on(future)
    }

    #[derive(Default)]
    struct ScriptedCapture {
        features: Mutex<HashMap<String, SignalFeatures>>,
        probes: Mutex<HashMap<String, ProbeReport>>,
        fingerprints: Mutex<HashMap<String, TrafficFingerprint>>,
    }

    impl FeatureExtractor for ScriptedCapture {
        fn extract(&self, segment: &CaptureSegment) -> Option<SignalFeatures> {
            self.features
                .lock()
                .unwrap()
                .get(&segment.sample_ref.0)
                .cloned()
        }
    }

    impl PayloadProbe for ScriptedCapture {
        fn probe(&self, segment: &CaptureSegment) -> Option<ProbeReport> {
            self.probes
                .lock()
                .unwrap()
                .get(&segment.sample_ref.0)
                .cloned()
        }
    }

    impl TrafficFingerprinter for ScriptedCapture {
        fn fingerprint(&self, segment: &CaptureSegment) -> Option<TrafficFingerprint> {
            self.fingerprints
                .lock()
                .unwrap()
                .get(&segment.sample_ref.0)
                .cloned()
        }
    }

    fn dvb_s2_features() -> SignalFeatures {
        SignalFeatures {
            symbol_rate_msps: 27.5,
            spectral_occupancy: 0.85,
            spectral_peak_count: 1,
            constellation_order_hint: 12,
            envelope_duty_cycle: 0.97,
            amplitude_kurtosis: -0.5,
        }
    }

    fn ambiguous_features() -> SignalFeatures {
        SignalFeatures {
            symbol_rate_msps: 3.0,
            spectral_occupancy: 0.45,
            spectral_peak_count: 0,
            constellation_order_hint: 10,
            envelope_duty_cycle: 0.7,
            amplitude_kurtosis: 3.0,
        }
    }

    fn handshake_report(reference: &str) -> ProbeReport {
        ProbeReport {
            segment_id: reference.into(),
            outcome: ProbeOutcome::EncryptionHandshake {
                protocol: "TLS".into(),
            },
            confidence: 0.9,
            entropy_bits_per_byte: 7.9,
        }
    }

    fn plaintext_report(reference: &str) -> ProbeReport {
        ProbeReport {
            segment_id: reference.into(),
            outcome: ProbeOutcome::StructuredPlaintext {
                marker: "MPEG-TS clear".into(),
                printable_fraction: 0.9,
                pii_suspected: false,
            },
            confidence: 0.88,
            entropy_bits_per_byte: 5.2,
        }
    }

    fn backhaul_fingerprint() -> TrafficFingerprint {
        TrafficFingerprint {
            framing: TransportFraming::MpegTs,
            stream_diversity: 24,
            mean_frame_len: 188.0,
            timing_regularity: 1.0,
        }
    }

    fn key() -> TransponderKey {
        TransponderKey::new("X", 12_500_000, 30_000)
    }

    fn segment(id: &str, pass: &str, end_ts: f64, quality: f32) -> CaptureSegment {
        CaptureSegment {
            segment_id: id.into(),
            key: key(),
            pass_id: pass.into(),
            start_ts: end_ts - 5.0,
            end_ts,
            sample_rate_hz: 30_000_000.0,
            sample_ref: SampleRef(format!("cap/{}", id)),
            quality,
            carrier_to_noise_db: None,
            transponder_meta: None,
        }
    }

    fn pipeline_with(capture: Arc<ScriptedCapture>) -> TransponderPipeline {
        TransponderPipeline::new(
            PipelineConfig::default(),
            capture.clone(),
            capture.clone(),
            capture,
            Arc::new(LogNotificationSink::new()),
        )
    }

    #[test]
    fn secure_transponder_converges_without_a_case() {
        // Three valid segments, all carrying recognized encryption headers.
        block_on(async {
            let capture = Arc::new(ScriptedCapture::default());
            for id in ["s1", "s2", "s3"] {
                let reference = format!("cap/{}", id);
                capture
                    .features
                    .lock()
                    .unwrap()
                    .insert(reference.clone(), dvb_s2_features());
                capture
                    .probes
                    .lock()
                    .unwrap()
                    .insert(reference.clone(), handshake_report(&reference));
            }
            let pipeline = pipeline_with(capture);

            let mut confidences = Vec::new();
            for (id, ts) in [("s1", 10.0), ("s2", 20.0), ("s3", 30.0)] {
                match pipeline
                    .process_segment(segment(id, "pass-1", ts, 0.9))
                    .await
                    .unwrap()
                {
                    SegmentOutcome::Classified { record, case } => {
                        assert_eq!(record.verdict, Verdict::Secure);
                        assert!(case.is_none());
                        confidences.push(record.confidence);
                    }
                    other => panic!("unexpected outcome {:?}", other),
                }
            }

            assert!(confidences.windows(2).all(|w| w[1] > w[0]));
            assert!(pipeline.tracker().all_cases().is_empty());
        });
    }

    #[test]
    fn unencrypted_transponder_opens_a_pending_case_on_third_segment() {
        // Segment 1 has unknown modulation at quality 0.4; segments 2 and 3
        // carry structured plaintext on DVB-S2, the third on a new pass.
        block_on(async {
            let capture = Arc::new(ScriptedCapture::default());
            capture
                .features
                .lock()
                .unwrap()
                .insert("cap/s1".into(), ambiguous_features());
            for id in ["s2", "s3"] {
                let reference = format!("cap/{}", id);
                capture
                    .features
                    .lock()
                    .unwrap()
                    .insert(reference.clone(), dvb_s2_features());
                capture
                    .probes
                    .lock()
                    .unwrap()
                    .insert(reference.clone(), plaintext_report(&reference));
                capture
                    .fingerprints
                    .lock()
                    .unwrap()
                    .insert(reference, backhaul_fingerprint());
            }
            let pipeline = pipeline_with(capture);

            pipeline
                .process_segment(segment("s1", "pass-1", 10.0, 0.4))
                .await
                .unwrap();
            pipeline
                .process_segment(segment("s2", "pass-1", 20.0, 0.9))
                .await
                .unwrap();
            let outcome = pipeline
                .process_segment(segment("s3", "pass-2", 30.0, 0.85))
                .await
                .unwrap();

            match outcome {
                SegmentOutcome::Classified { record, case } => {
                    assert_eq!(record.verdict, Verdict::Unencrypted);
                    assert_eq!(record.evidence_count, 3);
                    assert_eq!(record.traffic_category, Some(TrafficCategory::TelecomBackhaul));
                    let case = case.expect("disclosure case should open");
                    assert_eq!(case.status, CaseStatus::Pending);
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        });
    }

    #[test]
    fn sub_floor_quality_segment_is_rejected_but_counted_present() {
        block_on(async {
            let capture = Arc::new(ScriptedCapture::default());
            let pipeline = pipeline_with(capture);

            let outcome = pipeline
                .process_segment(segment("s1", "pass-1", 42.0, 0.1))
                .await
                .unwrap();

            assert!(matches!(
                outcome,
                SegmentOutcome::Rejected {
                    reason: RejectReason::LowQuality { .. }
                }
            ));
            let transponder = pipeline.ledger().transponder(&key()).await.unwrap();
            assert_eq!(transponder.last_observed, 42.0);
            assert!(pipeline.ledger().current_record(&key()).await.is_none());
            assert_eq!(pipeline.metrics().snapshot().rejected, 1);
        });
    }

    #[test]
    fn unreadable_capture_reference_is_rejected() {
        block_on(async {
            // No scripted features: the extractor returns None.
            let capture = Arc::new(ScriptedCapture::default());
            let pipeline = pipeline_with(capture);

            let outcome = pipeline
                .process_segment(segment("s1", "pass-1", 10.0, 0.9))
                .await
                .unwrap();
            assert!(matches!(
                outcome,
                SegmentOutcome::Rejected {
                    reason: RejectReason::Unreadable
                }
            ));
        });
    }

    #[test]
    fn redelivered_segment_is_reported_as_duplicate() {
        block_on(async {
            let capture = Arc::new(ScriptedCapture::default());
            capture
                .features
                .lock()
                .unwrap()
                .insert("cap/s1".into(), dvb_s2_features());
            capture
                .probes
                .lock()
                .unwrap()
                .insert("cap/s1".into(), handshake_report("cap/s1"));
            let pipeline = pipeline_with(capture);

            pipeline
                .process_segment(segment("s1", "pass-1", 10.0, 0.9))
                .await
                .unwrap();
            let outcome = pipeline
                .process_segment(segment("s1", "pass-1", 10.0, 0.9))
                .await
                .unwrap();

            assert!(matches!(outcome, SegmentOutcome::Duplicate));
            assert_eq!(pipeline.metrics().snapshot().duplicates, 1);
        });
    }

    #[test]
    fn stale_case_times_out_once_and_reopens_on_new_evidence() {
        block_on(async {
            let capture = Arc::new(ScriptedCapture::default());
            for id in ["s1", "s2", "s3", "s4"] {
                let reference = format!("cap/{}", id);
                capture
                    .features
                    .lock()
                    .unwrap()
                    .insert(reference.clone(), dvb_s2_features());
                capture
                    .probes
                    .lock()
                    .unwrap()
                    .insert(reference.clone(), plaintext_report(&reference));
            }
            let pipeline = pipeline_with(capture);

            pipeline
                .process_segment(segment("s1", "pass-1", 10.0, 0.9))
                .await
                .unwrap();
            pipeline
                .process_segment(segment("s2", "pass-1", 20.0, 0.9))
                .await
                .unwrap();
            pipeline
                .process_segment(segment("s3", "pass-2", 30.0, 0.9))
                .await
                .unwrap();
            assert!(pipeline.tracker().open_case_for(&key()).is_some());

            // Ninety days on with no acknowledgment: auto-close exactly once.
            let deadline = 30.0 + 90.0 * DAY_SECS;
            let closed = pipeline.sweep_disclosures(deadline + 1.0);
            assert_eq!(closed.len(), 1);
            assert_eq!(closed[0].status, CaseStatus::ClosedNoResponse);
            assert!(pipeline.sweep_disclosures(deadline + 2.0).is_empty());

            // Renewed unencrypted evidence opens a fresh case.
            let outcome = pipeline
                .process_segment(segment("s4", "pass-3", deadline + 10.0, 0.9))
                .await
                .unwrap();
            match outcome {
                SegmentOutcome::Classified { case, .. } => {
                    let case = case.expect("case should reopen");
                    assert_eq!(case.status, CaseStatus::Pending);
                }
                other => panic!("unexpected outcome {:?}", other),
            }
            assert_eq!(pipeline.tracker().cases_for(&key()).len(), 2);
            assert_eq!(pipeline.metrics().snapshot().cases_opened, 2);
            assert_eq!(pipeline.metrics().snapshot().cases_closed, 1);
        });
    }
}

use crate::generator::profile::SyntheticCaptureBank;
use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use auditcore::capture::CaptureSegment;
use auditcore::disclosure::{DisclosureCase, LogNotificationSink};
use auditcore::ledger::AuditSnapshot;
use auditcore::modulation::SpectralFeatureExtractor;
use auditcore::pipeline::{SegmentOutcome, TransponderPipeline};
use auditcore::probes::ByteStructureProbe;
use auditcore::telemetry::MetricsSnapshot;
use auditcore::traffic::TransportFingerprinter;
use std::sync::Arc;
use tokio::sync::mpsc;

const FFT_SIZE: usize = 1024;

/// Aggregate result of an audit run.
pub struct AuditSummary {
    pub metrics: MetricsSnapshot,
    pub snapshot: AuditSnapshot,
    pub cases: Vec<DisclosureCase>,
}

/// Owns the pipeline and drives segments through it, either as an offline
/// batch or from a bounded admission queue.
#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
    pipeline: Arc<TransponderPipeline>,
}

impl Runner {
    pub fn new(config: WorkflowConfig, bank: Arc<SyntheticCaptureBank>) -> Self {
        let extractor = Arc::new(SpectralFeatureExtractor::new(bank.clone(), FFT_SIZE));
        let probe = Arc::new(ByteStructureProbe::new(bank.clone()));
        let fingerprinter = Arc::new(TransportFingerprinter::new(bank));
        let pipeline = Arc::new(TransponderPipeline::new(
            config.to_pipeline_config(),
            extractor,
            probe,
            fingerprinter,
            Arc::new(LogNotificationSink::new()),
        ));
        Self { config, pipeline }
    }

    pub fn pipeline(&self) -> &Arc<TransponderPipeline> {
        &self.pipeline
    }

    pub async fn process(&self, segment: CaptureSegment) -> anyhow::Result<SegmentOutcome> {
        let segment_id = segment.segment_id.clone();
        self.pipeline
            .process_segment(segment)
            .await
            .with_context(|| format!("processing capture segment {}", segment_id))
    }

    /// Drive a finite batch through the pipeline and summarize the audit
    /// state afterwards.
    pub async fn execute_batch(
        &self,
        segments: Vec<CaptureSegment>,
    ) -> anyhow::Result<AuditSummary> {
        let mut latest = 0.0f64;
        for segment in segments {
            latest = latest.max(segment.end_ts);
            self.process(segment).await?;
        }
        Ok(self.summarize(latest).await)
    }

    pub async fn summarize(&self, now: f64) -> AuditSummary {
        AuditSummary {
            metrics: self.pipeline.metrics().snapshot(),
            snapshot: self.pipeline.ledger().snapshot(now).await,
            cases: self.pipeline.tracker().all_cases(),
        }
    }

    /// Bounded admission channel. Senders block once `queue_depth` segments
    /// are waiting; valid segments are never dropped.
    pub fn admission_queue(
        &self,
    ) -> (mpsc::Sender<CaptureSegment>, mpsc::Receiver<CaptureSegment>) {
        mpsc::channel(self.config.queue_depth.max(1))
    }

    /// Drain the admission queue until every sender is gone.
    pub async fn run_queue(
        &self,
        mut receiver: mpsc::Receiver<CaptureSegment>,
    ) -> anyhow::Result<usize> {
        let mut handled = 0usize;
        while let Some(segment) = receiver.recv().await {
            self.process(segment).await?;
            handled += 1;
        }
        Ok(handled)
    }
}

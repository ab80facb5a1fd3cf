use crate::capture::segment::CaptureSegment;
use crate::prelude::{PipelineConfig, PipelineError, PipelineResult, PipelineStage};
use crate::telemetry::log::LogManager;

/// Why a segment was refused admission.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    TooShort { duration_secs: f64 },
    LowQuality { quality: f32 },
    /// Raw samples could not be resolved or the feature extractor returned
    /// no result.
    Unreadable,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::TooShort { duration_secs } => {
                write!(f, "segment too short ({:.2}s)", duration_secs)
            }
            RejectReason::LowQuality { quality } => {
                write!(f, "quality {:.2} under floor", quality)
            }
            RejectReason::Unreadable => write!(f, "capture reference unreadable"),
        }
    }
}

/// Outcome of admission. Rejection is a reported result, not an error;
/// rejected segments still count toward presence tracking and statistics.
#[derive(Debug, Clone)]
pub enum Admission {
    Admitted(CaptureSegment),
    Rejected {
        segment: CaptureSegment,
        reason: RejectReason,
    },
}

/// Admission stage applying the minimum-duration and quality floors.
pub struct IngestStage {
    config: Option<PipelineConfig>,
    logger: LogManager,
}

impl IngestStage {
    pub fn new() -> Self {
        Self {
            config: None,
            logger: LogManager::new(),
        }
    }
}

impl Default for IngestStage {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStage for IngestStage {
    type Input = CaptureSegment;
    type Output = Admission;

    fn initialize(&mut self, config: &PipelineConfig) -> PipelineResult<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, segment: CaptureSegment) -> PipelineResult<Admission> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| PipelineError::Internal("stage not initialized".into()))?;

        let duration = segment.duration_secs();
        if duration < config.min_duration_secs {
            self.logger.record(&format!(
                "LOW_QUALITY {}: {:.2}s under minimum duration",
                segment.segment_id, duration
            ));
            return Ok(Admission::Rejected {
                segment,
                reason: RejectReason::TooShort {
                    duration_secs: duration,
                },
            });
        }

        if segment.quality < config.quality_floor {
            self.logger.record(&format!(
                "LOW_QUALITY {}: quality {:.2} under floor {:.2}",
                segment.segment_id, segment.quality, config.quality_floor
            ));
            let quality = segment.quality;
            return Ok(Admission::Rejected {
                segment,
                reason: RejectReason::LowQuality { quality },
            });
        }

        Ok(Admission::Admitted(segment))
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}

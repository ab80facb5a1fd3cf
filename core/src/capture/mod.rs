pub mod ingest;
pub mod segment;
pub mod transponder;

pub use ingest::{Admission, IngestStage, RejectReason};
pub use segment::{CaptureSegment, SampleRef};
pub use transponder::{AnalysisDepth, Polarization, Transponder, TransponderKey, TransponderMeta};

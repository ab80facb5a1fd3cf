//! Core classification pipeline for the satellite transponder encryption
//! audit platform.
//!
//! The modules implement the capture-to-disclosure flow with safe
//! abstractions, per-transponder serialization, and well-defined pipeline
//! stages: ingest admission, modulation identification, payload-structure
//! probing, encryption classification, traffic categorization, the audit
//! ledger, and disclosure tracking.

pub mod capture;
pub mod classify;
pub mod disclosure;
pub mod ledger;
pub mod modulation;
pub mod pipeline;
pub mod prelude;
pub mod probes;
pub mod signal;
pub mod telemetry;
pub mod traffic;

pub use prelude::{PipelineConfig, PipelineError, PipelineResult, PipelineStage};

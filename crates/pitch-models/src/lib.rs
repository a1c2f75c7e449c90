//! Shared data models for the PitchScope analysis pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Run identifiers
//! - The exported track record handed to callers
//! - Per-view output status, warnings and run statistics
//! - Encoding configuration for rendered views

pub mod encoding;
pub mod export;
pub mod result;
pub mod run;
pub mod view;

// Re-export common types
pub use encoding::{EncodingConfig, VideoCodec};
pub use export::{ExportEntry, ExportRecord, Position};
pub use result::{AnalysisResult, PipelineWarning, RunStats, TrackSummary, WarningKind};
pub use run::RunId;
pub use view::{OutputStatus, ViewKind, ViewOutput};

//! Batch worker for match analysis.
//!
//! This crate provides:
//! - Environment configuration mapped onto the pipeline settings
//! - Input validation and atomic result persistence
//! - Run-scoped structured logging
//! - Exit codes for the `pitch-worker` binary

pub mod config;
pub mod error;
pub mod job;
pub mod logging;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use job::{validate_input, write_result, AnalysisJob, SUPPORTED_EXTENSIONS};
pub use logging::RunLogger;

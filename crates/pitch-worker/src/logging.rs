//! Lifecycle log lines for one analysis run.
//!
//! Every line carries the short run id and the operation; the span returned
//! by [`RunLogger::create_span`] carries the full id.

use tracing::{error, info, warn, Span};

use pitch_models::{AnalysisResult, RunId};

#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: RunId,
    operation: &'static str,
}

impl RunLogger {
    /// `operation` is "analyze" or "dry_run".
    pub fn new(run_id: &RunId, operation: &'static str) -> Self {
        Self {
            run_id: run_id.clone(),
            operation,
        }
    }

    pub fn log_start(&self, input: &str) {
        info!(run = self.run_id.short(), operation = self.operation, input, "Run started");
    }

    pub fn log_warning(&self, message: &str) {
        warn!(run = self.run_id.short(), operation = self.operation, "{}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(run = self.run_id.short(), operation = self.operation, "Run failed: {}", message);
    }

    /// Headline numbers, then one line per recorded warning.
    pub fn log_completion(&self, result: &AnalysisResult) {
        info!(
            run = self.run_id.short(),
            operation = self.operation,
            tracks = result.stats.tracks,
            frames = result.stats.frames_read,
            dropped = result.stats.frames_dropped,
            outputs = result.succeeded_outputs(),
            warnings = result.warnings.len(),
            partial = result.is_partial(),
            "Run completed"
        );
        for warning in &result.warnings {
            self.log_warning(&warning.message);
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn create_span(&self) -> Span {
        tracing::info_span!("run", run_id = %self.run_id, operation = self.operation)
    }
}

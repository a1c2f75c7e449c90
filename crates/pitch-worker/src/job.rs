//! One analysis job: validate the input, run the pipeline, persist the result.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, Instrument};

use pitch_media::fs_utils::{partial_path, promote_file};
use pitch_media::{FfmpegSinkFactory, MemorySinkFactory, ObjectDetector, Pipeline, PipelineConfig, SinkFactory};
use pitch_models::{AnalysisResult, RunId};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::RunLogger;

/// Container extensions accepted by the worker.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv"];

/// Reject inputs whose extension is not a supported container.
pub fn validate_input(path: &Path) -> WorkerResult<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(WorkerError::invalid_input(format!(
            "{}: expected one of {}",
            path.display(),
            SUPPORTED_EXTENSIONS.join(", ")
        )))
    }
}

/// Write the result as pretty JSON, atomically.
pub async fn write_result(result: &AnalysisResult, path: &Path) -> WorkerResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_vec_pretty(result)?;
    let part = partial_path(path);
    tokio::fs::write(&part, json).await?;
    promote_file(&part, path).await?;
    Ok(())
}

/// A single video to analyze.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    video: PathBuf,
    result_path: PathBuf,
    dry_run: bool,
    run_id: RunId,
}

impl AnalysisJob {
    pub fn new(video: impl Into<PathBuf>, result_path: impl Into<PathBuf>) -> Self {
        Self {
            video: video.into(),
            result_path: result_path.into(),
            dry_run: false,
            run_id: RunId::new(),
        }
    }

    /// Write a PNG preview of each view's last frame instead of videos.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Use a caller-chosen run id instead of a generated one.
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    fn operation(&self) -> &'static str {
        if self.dry_run {
            "dry_run"
        } else {
            "analyze"
        }
    }

    fn sink_factory(&self, config: &PipelineConfig) -> Arc<dyn SinkFactory> {
        if self.dry_run {
            Arc::new(MemorySinkFactory::new().persist_last_frame())
        } else {
            Arc::new(FfmpegSinkFactory::new(config.encoding.clone()))
        }
    }

    /// Run the pipeline and persist the result JSON.
    ///
    /// Nothing is written when the run fails.
    pub async fn execute(
        &self,
        config: PipelineConfig,
        detector: Arc<dyn ObjectDetector>,
        cancel_rx: watch::Receiver<bool>,
    ) -> WorkerResult<AnalysisResult> {
        let logger = RunLogger::new(&self.run_id, self.operation());

        async {
            validate_input(&self.video)?;
            logger.log_start(&self.video.display().to_string());

            let sinks = self.sink_factory(&config);
            let pipeline = Pipeline::new(config, detector, sinks)
                .with_cancel(cancel_rx)
                .with_run_id(self.run_id.clone());

            let result = pipeline.run(&self.video).await.map_err(|e| {
                logger.log_error(&e.to_string());
                WorkerError::from(e)
            })?;

            write_result(&result, &self.result_path).await?;
            info!(path = %self.result_path.display(), "Result written");
            logger.log_completion(&result);
            Ok(result)
        }
        .instrument(logger.create_span())
        .await
    }
}

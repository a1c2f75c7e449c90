//! Pipeline orchestrator.
//!
//! Drives one video through the frame loop:
//!
//! ```text
//! FrameSource -> DetectorTracker -> TrackAccumulator -> 4 renderers -> 4 sinks
//!                                          \-> exporter -> AnalysisResult
//! ```
//!
//! Lifecycle: `Idle -> Opening -> Streaming -> Finalizing -> Done`, with
//! `Aborted` reachable from every non-terminal state. Recoverable problems
//! (an undecodable frame, one failing encoder) become warnings on the
//! result; anything else aborts the run and discards every partial output.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

use pitch_models::{AnalysisResult, PipelineWarning, RunId, RunStats, ViewKind, ViewOutput};

use crate::config::PipelineConfig;
use crate::detection::ObjectDetector;
use crate::encode::{FrameSink, SinkFactory};
use crate::error::{MediaError, MediaResult};
use crate::export::{export, summarize};
use crate::metrics;
use crate::render::{render_views, standard_renderers, PitchProjection, RenderContext, ViewRenderer};
use crate::source::{FfmpegFrameSource, FrameSource, SourceEvent, StreamInfo};
use crate::tracking::{DetectorTracker, TrackAccumulator};

/// Frames between progress log lines.
const PROGRESS_INTERVAL: u64 = 250;

/// Lifecycle state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Opening,
    Streaming,
    Finalizing,
    Done,
    Aborted,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Opening => "opening",
            Self::Streaming => "streaming",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// One view's sink and bookkeeping.
struct SinkSlot {
    view: ViewKind,
    path: PathBuf,
    sink: Option<Box<dyn FrameSink>>,
    frames: u64,
    error: Option<String>,
}

impl SinkSlot {
    fn is_live(&self) -> bool {
        self.sink.is_some()
    }

    /// Record a failure and abort the sink if it is still open.
    async fn fail(&mut self, err: MediaError, frame_index: Option<u64>, warnings: &mut Vec<PipelineWarning>) {
        warn!(view = %self.view, frame = ?frame_index, "View failed: {}", err);
        metrics::record_encode_failure(self.view.as_str());
        if let Some(sink) = self.sink.take() {
            sink.abort().await;
        }
        warnings.push(PipelineWarning::encode(self.view, frame_index, err.to_string()));
        self.error = Some(err.to_string());
    }
}

/// Counters gathered by the frame loop.
struct StreamOutcome {
    accumulator: TrackAccumulator,
    frames_read: u64,
    frames_dropped: u64,
    detections: u64,
}

/// Orchestrates one analysis run at a time.
pub struct Pipeline {
    config: PipelineConfig,
    detector: Arc<dyn ObjectDetector>,
    sinks: Arc<dyn SinkFactory>,
    renderers: Vec<Box<dyn ViewRenderer>>,
    cancel_rx: Option<watch::Receiver<bool>>,
    state: watch::Sender<PipelineState>,
    run_id: Option<RunId>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, detector: Arc<dyn ObjectDetector>, sinks: Arc<dyn SinkFactory>) -> Self {
        let renderers = standard_renderers(&config.pitch);
        let (state, _) = watch::channel(PipelineState::Idle);
        Self {
            config,
            detector,
            sinks,
            renderers,
            cancel_rx: None,
            state,
            run_id: None,
        }
    }

    /// Set cancellation signal, checked at every frame boundary.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Use a caller-chosen run id instead of a generated one.
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Analyze a local video file.
    ///
    /// The output files are named after the input's file stem.
    pub async fn run(&self, video_path: impl AsRef<Path>) -> MediaResult<AnalysisResult> {
        let path = video_path.as_ref();
        let run_id = self.run_id.clone().unwrap_or_default();
        let span = tracing::info_span!("pipeline", run_id = %run_id, input = %path.display());

        async {
            let started_at = Utc::now();
            self.transition(PipelineState::Opening);
            self.check_model()?;

            let source = FfmpegFrameSource::open(path).await.map_err(|e| self.abort(e))?;
            self.execute(Box::new(source), &output_stem(path), run_id, started_at).await
        }
        .instrument(span)
        .await
    }

    /// Analyze frames from an already opened source.
    pub async fn run_source(&self, mut source: Box<dyn FrameSource>, stem: &str) -> MediaResult<AnalysisResult> {
        let run_id = self.run_id.clone().unwrap_or_default();
        let span = tracing::info_span!("pipeline", run_id = %run_id, input = stem);

        async {
            let started_at = Utc::now();
            self.transition(PipelineState::Opening);
            if let Err(e) = self.check_model() {
                source.close().await;
                return Err(e);
            }
            self.execute(source, stem, run_id, started_at).await
        }
        .instrument(span)
        .await
    }

    fn check_model(&self) -> MediaResult<()> {
        self.detector.ensure_ready().map_err(|e| {
            let e = match e {
                MediaError::ModelUnavailable(_) => e,
                other => MediaError::model_unavailable(other.to_string()),
            };
            self.abort(e)
        })
    }

    fn transition(&self, next: PipelineState) {
        let previous = self.state.send_replace(next);
        info!(from = %previous, to = %next, "Pipeline state");
    }

    /// Move to `Aborted` and hand the error back.
    ///
    /// A run that already reached a terminal state keeps it.
    fn abort(&self, err: MediaError) -> MediaError {
        error!(kind = err.kind(), "Run aborted: {}", err);
        metrics::record_run_failed(err.kind());
        if !self.state().is_terminal() {
            self.transition(PipelineState::Aborted);
        }
        err
    }

    async fn execute(
        &self,
        mut source: Box<dyn FrameSource>,
        stem: &str,
        run_id: RunId,
        started_at: DateTime<Utc>,
    ) -> MediaResult<AnalysisResult> {
        let clock = Instant::now();
        let info = source.info().clone();

        if let Err(e) = tokio::fs::create_dir_all(&self.config.output_dir).await {
            source.close().await;
            return Err(self.abort(e.into()));
        }

        let mut warnings = Vec::new();
        let mut slots = self.open_sinks(stem, &info, &mut warnings).await;

        self.transition(PipelineState::Streaming);
        let streamed = self.stream(source.as_mut(), &info, &mut slots, &mut warnings).await;
        source.close().await;

        let outcome = match streamed {
            Ok(outcome) => outcome,
            Err(e) => {
                for slot in &mut slots {
                    if let Some(sink) = slot.sink.take() {
                        sink.abort().await;
                    }
                }
                return Err(self.abort(e));
            }
        };

        self.transition(PipelineState::Finalizing);
        let outputs = self.finish_sinks(slots, &mut warnings).await;

        let table = outcome.accumulator.snapshot();
        let export_record = export(table);
        let summaries = summarize(table, info.fps);

        let stats = RunStats {
            width: info.width,
            height: info.height,
            fps: info.fps,
            expected_frames: info
                .expected_frames
                .max(outcome.frames_read + outcome.frames_dropped),
            frames_read: outcome.frames_read,
            frames_dropped: outcome.frames_dropped,
            detections: outcome.detections,
            tracks: table.len(),
            elapsed_ms: clock.elapsed().as_millis() as u64,
        };

        let path_of = |view: ViewKind| {
            outputs
                .iter()
                .find(|o| o.view == view && o.is_success())
                .and_then(|o| o.path.clone())
        };

        let result = AnalysisResult {
            run_id,
            main_video_path: path_of(ViewKind::Main),
            circle_video_path: path_of(ViewKind::Circle),
            voronoi_video_path: path_of(ViewKind::Voronoi),
            line_video_path: path_of(ViewKind::Line),
            export_record,
            outputs,
            warnings,
            summaries,
            stats,
            started_at,
            finished_at: Utc::now(),
        };

        metrics::record_run_completed(clock.elapsed().as_secs_f64(), result.is_partial());
        info!(
            frames = result.stats.frames_read,
            dropped = result.stats.frames_dropped,
            tracks = result.stats.tracks,
            outputs = result.succeeded_outputs(),
            warnings = result.warnings.len(),
            elapsed_ms = result.stats.elapsed_ms,
            "Run complete"
        );
        self.transition(PipelineState::Done);

        Ok(result)
    }

    async fn open_sinks(&self, stem: &str, info: &StreamInfo, warnings: &mut Vec<PipelineWarning>) -> Vec<SinkSlot> {
        let mut slots = Vec::with_capacity(self.renderers.len());

        for renderer in &self.renderers {
            let view = renderer.view();
            let path = self
                .config
                .output_dir
                .join(view.file_name(stem, self.sinks.extension()));

            // Pitch views use the canvas size, the main view the frame size
            let view_info = match view {
                ViewKind::Main => info.clone(),
                _ => StreamInfo {
                    width: self.config.pitch.width,
                    height: self.config.pitch.height,
                    ..info.clone()
                },
            };

            let mut slot = SinkSlot {
                view,
                path: path.clone(),
                sink: None,
                frames: 0,
                error: None,
            };
            match self.sinks.open(view, &path, &view_info).await {
                Ok(sink) => slot.sink = Some(sink),
                Err(e) => slot.fail(e, None, warnings).await,
            }
            slots.push(slot);
        }

        slots
    }

    async fn stream(
        &self,
        source: &mut dyn FrameSource,
        info: &StreamInfo,
        slots: &mut [SinkSlot],
        warnings: &mut Vec<PipelineWarning>,
    ) -> MediaResult<StreamOutcome> {
        let mut stage = DetectorTracker::new(Arc::clone(&self.detector), self.config.tracker.clone());
        let mut accumulator = TrackAccumulator::new();
        let projection = PitchProjection::new(info.width, info.height, self.config.pitch.width, self.config.pitch.height);

        let mut frames_read = 0u64;
        let mut frames_dropped = 0u64;
        let mut detections = 0u64;

        loop {
            if self.is_cancelled() {
                info!(frames = frames_read, "Cancellation requested");
                return Err(MediaError::Cancelled);
            }

            let frame = match source.read().await? {
                SourceEvent::EndOfStream => break,
                SourceEvent::Corrupt { index, reason } => {
                    let err = MediaError::frame_decode(index, reason);
                    warn!(frame = index, "Skipping frame: {}", err);
                    metrics::record_frame_dropped();
                    warnings.push(PipelineWarning::frame_decode(index, err.to_string()));
                    frames_dropped += 1;
                    continue;
                }
                SourceEvent::Frame(frame) => frame,
            };

            let frame_clock = Instant::now();
            let index = frame.index();

            let association = stage.process(&frame)?;
            accumulator.update(index, &association.tracked)?;
            accumulator.mark_inactive(&association.deactivated);
            metrics::record_tracks_created(association.created);
            metrics::set_active_tracks(stage.active_track_count());

            let live: Vec<&dyn ViewRenderer> = self
                .renderers
                .iter()
                .zip(slots.iter())
                .filter(|(_, slot)| slot.is_live())
                .map(|(renderer, _)| renderer.as_ref())
                .collect();

            let rendered = {
                let ctx = RenderContext {
                    frame: &frame,
                    tracked: &association.tracked,
                    tracks: accumulator.snapshot(),
                    projection: &projection,
                };
                render_views(&live, &ctx)
            };

            for (view, image) in rendered {
                let Some(slot) = slots.iter_mut().find(|s| s.view == view) else {
                    continue;
                };
                let Some(sink) = slot.sink.as_mut() else {
                    continue;
                };
                let written = sink.write(&image).await;
                match written {
                    Ok(()) => slot.frames += 1,
                    Err(e) => slot.fail(e, Some(index), warnings).await,
                }
            }

            frames_read += 1;
            detections += association.tracked.len() as u64;
            metrics::record_frame(frame_clock.elapsed().as_secs_f64(), association.tracked.len());
            debug!(frame = index, tracked = association.tracked.len(), "Frame processed");

            if frames_read % PROGRESS_INTERVAL == 0 {
                info!(
                    frames = frames_read,
                    expected = info.expected_frames,
                    tracks = accumulator.snapshot().len(),
                    "Progress"
                );
            }
        }

        Ok(StreamOutcome {
            accumulator,
            frames_read,
            frames_dropped,
            detections,
        })
    }

    async fn finish_sinks(&self, slots: Vec<SinkSlot>, warnings: &mut Vec<PipelineWarning>) -> Vec<ViewOutput> {
        let mut outputs = Vec::with_capacity(slots.len());

        for mut slot in slots {
            let output = match slot.sink.take() {
                Some(sink) => match sink.finish().await {
                    Ok(path) => ViewOutput::succeeded(slot.view, path, slot.frames),
                    Err(e) => {
                        slot.fail(e, None, warnings).await;
                        ViewOutput::failed(slot.view, slot.frames, slot.error.clone().unwrap_or_default())
                    }
                },
                None => ViewOutput::failed(
                    slot.view,
                    slot.frames,
                    slot.error
                        .clone()
                        .unwrap_or_else(|| "encoder not opened".to_string()),
                ),
            };
            debug!(view = %slot.view, path = %slot.path.display(), ok = output.is_success(), "Finalized view");
            outputs.push(output);
        }

        outputs
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_rx.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

/// Output file stem for an input path.
fn output_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "video".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PitchConfig;
    use crate::detection::{BoundingBox, Detection, MockObjectDetector, CLASS_PERSON};
    use crate::encode::{MemorySinkFactory, SinkFailure};
    use crate::frame::Frame;
    use crate::source::MemoryFrameSource;
    use image::{Rgb, RgbImage};
    use pitch_models::{ExportRecord, WarningKind};
    use tempfile::TempDir;

    const FRAME_W: u32 = 100;
    const FRAME_H: u32 = 60;

    fn config(dir: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::default().with_output_dir(dir);
        config.pitch = PitchConfig {
            width: 210,
            height: 136,
            ..PitchConfig::default()
        };
        config
    }

    fn frames(n: usize) -> Vec<RgbImage> {
        vec![RgbImage::from_pixel(FRAME_W, FRAME_H, Rgb([40, 40, 40])); n]
    }

    /// Person whose foot point is at (x, y).
    fn person_at(x: f64, y: f64) -> Detection {
        Detection::new(BoundingBox::new(x - 5.0, y - 20.0, 10.0, 20.0), CLASS_PERSON, 0.9)
    }

    fn ready_detector() -> MockObjectDetector {
        let mut detector = MockObjectDetector::new();
        detector.expect_name().return_const("mock");
        detector.expect_ensure_ready().returning(|| Ok(()));
        detector
    }

    /// One object moving 10 px right per frame.
    fn linear_detector() -> MockObjectDetector {
        let mut detector = ready_detector();
        detector
            .expect_detect()
            .returning(|frame: &Frame| Ok(vec![person_at(frame.index() as f64 * 10.0, 40.0)]));
        detector
    }

    fn pipeline(dir: &Path, detector: MockObjectDetector, sinks: &MemorySinkFactory) -> Pipeline {
        Pipeline::new(config(dir), Arc::new(detector), Arc::new(sinks.clone()))
    }

    fn source(n: usize) -> Box<dyn FrameSource> {
        Box::new(MemoryFrameSource::new(25.0, frames(n)).unwrap())
    }

    #[tokio::test]
    async fn test_linear_motion_single_track() {
        let dir = TempDir::new().unwrap();
        let sinks = MemorySinkFactory::new();
        let pipeline = pipeline(dir.path(), linear_detector(), &sinks);

        let result = pipeline.run_source(source(10), "clip").await.unwrap();

        assert_eq!(pipeline.state(), PipelineState::Done);
        assert_eq!(result.export_record.track_count(), 1);
        let entries = result.export_record.track(1).unwrap();
        assert_eq!(entries.len(), 10);
        assert!(entries.windows(2).all(|w| w[1].position.x > w[0].position.x));
        assert_eq!(entries.iter().map(|e| e.frame_index).collect::<Vec<_>>(), (0..10).collect::<Vec<_>>());

        assert_eq!(result.succeeded_outputs(), 4);
        assert!(!result.is_partial());
        for view in ViewKind::ALL {
            assert_eq!(sinks.frame_count(view), 10);
            assert!(sinks.was_finished(view));
        }
        assert_eq!(
            result.main_video_path,
            Some(dir.path().join("clip_main.mp4"))
        );
        assert_eq!(sinks.frames(ViewKind::Main)[0].dimensions(), (FRAME_W, FRAME_H));
        assert_eq!(sinks.frames(ViewKind::Voronoi)[0].dimensions(), (210, 136));

        let summary = &result.summaries[0];
        assert_eq!(summary.observations, 10);
        assert!((summary.distance_px - 90.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_corrupt_mid_stream_frame_is_skipped() {
        let dir = TempDir::new().unwrap();
        let sinks = MemorySinkFactory::new();
        let pipeline = pipeline(dir.path(), linear_detector(), &sinks);
        let source = MemoryFrameSource::new(25.0, frames(10))
            .unwrap()
            .corrupt_at(4, "invalid NAL unit");

        let result = pipeline.run_source(Box::new(source), "clip").await.unwrap();

        let entries = result.export_record.track(1).unwrap();
        assert_eq!(entries.len(), 9);
        assert!(entries.iter().all(|e| e.frame_index != 4));

        let decode: Vec<_> = result.warnings_of(WarningKind::FrameDecode).collect();
        assert_eq!(decode.len(), 1);
        assert_eq!(decode[0].frame_index, Some(4));

        assert_eq!(result.succeeded_outputs(), 4);
        assert!(result.is_partial());
        assert_eq!(result.stats.frames_read, result.stats.expected_frames - result.stats.frames_dropped);
        assert_eq!((result.stats.frames_read, result.stats.frames_dropped), (9, 1));
        for view in ViewKind::ALL {
            assert_eq!(sinks.frame_count(view), 9);
        }
    }

    #[tokio::test]
    async fn test_corrupt_run_ages_tracks_out() {
        let dir = TempDir::new().unwrap();
        let sinks = MemorySinkFactory::new();
        let mut config = config(dir.path());
        config.tracker.max_inactive_frames = 2;

        let mut detector = ready_detector();
        detector.expect_detect().returning(|_| Ok(vec![person_at(50.0, 40.0)]));
        let pipeline = Pipeline::new(config, Arc::new(detector), Arc::new(sinks.clone()));

        let mut source = MemoryFrameSource::new(25.0, frames(7)).unwrap();
        for index in 1..=5 {
            source = source.corrupt_at(index, "missing reference frame");
        }

        let result = pipeline.run_source(Box::new(source), "clip").await.unwrap();

        // Six unmatched frame indices exceed the limit, so frame 6 starts a new track
        assert_eq!(result.export_record.track_ids().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(result.export_record.track(1).unwrap()[0].frame_index, 0);
        assert_eq!(result.export_record.track(2).unwrap()[0].frame_index, 6);
        assert_eq!(result.stats.frames_dropped, 5);
    }

    #[tokio::test]
    async fn test_corrupt_header_creates_no_outputs() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("upload.mp4");
        tokio::fs::write(&input, [0u8; 64]).await.unwrap();
        let out = dir.path().join("out");

        let sinks = MemorySinkFactory::new().persist_last_frame();
        let mut detector = ready_detector();
        detector.expect_detect().never();
        let pipeline = pipeline(&out, detector, &sinks);

        let err = pipeline.run(&input).await.unwrap_err();

        assert!(matches!(err, MediaError::MediaOpen { .. }));
        assert_eq!(pipeline.state(), PipelineState::Aborted);
        assert!(pipeline.state().is_terminal());
        assert!(!out.exists());
        assert_eq!(sinks.frame_count(ViewKind::Main), 0);
    }

    #[tokio::test]
    async fn test_model_unavailable_before_any_frame() {
        let dir = TempDir::new().unwrap();
        let sinks = MemorySinkFactory::new();
        let mut detector = MockObjectDetector::new();
        detector.expect_name().return_const("mock");
        detector
            .expect_ensure_ready()
            .returning(|| Err(MediaError::model_unavailable("models/yolov8n.onnx not found")));
        detector.expect_detect().never();
        let pipeline = pipeline(dir.path(), detector, &sinks);

        let err = pipeline.run_source(source(3), "clip").await.unwrap_err();

        assert!(matches!(err, MediaError::ModelUnavailable(_)));
        assert_eq!(pipeline.state(), PipelineState::Aborted);
        for view in ViewKind::ALL {
            assert!(!sinks.was_finished(view));
            assert_eq!(sinks.frame_count(view), 0);
        }
    }

    #[tokio::test]
    async fn test_encoder_failure_is_partial_success() {
        let dir = TempDir::new().unwrap();
        let sinks = MemorySinkFactory::new().fail(ViewKind::Voronoi, SinkFailure::Write(3));
        let pipeline = pipeline(dir.path(), linear_detector(), &sinks);

        let result = pipeline.run_source(source(10), "clip").await.unwrap();

        assert!(result.voronoi_video_path.is_none());
        assert!(result.line_video_path.is_some());
        assert_eq!(result.succeeded_outputs(), 3);
        assert!(sinks.was_aborted(ViewKind::Voronoi));
        assert_eq!(sinks.frame_count(ViewKind::Voronoi), 3);
        assert_eq!(sinks.frame_count(ViewKind::Circle), 10);

        let encode: Vec<_> = result.warnings_of(WarningKind::Encode).collect();
        assert_eq!(encode.len(), 1);
        assert_eq!(encode[0].view, Some(ViewKind::Voronoi));
        assert_eq!(encode[0].frame_index, Some(3));
        // Tracking is unaffected
        assert_eq!(result.export_record.entry_count(), 10);
    }

    #[tokio::test]
    async fn test_encoder_open_and_finish_failures() {
        let dir = TempDir::new().unwrap();
        let sinks = MemorySinkFactory::new()
            .fail(ViewKind::Circle, SinkFailure::Open)
            .fail(ViewKind::Line, SinkFailure::Finish);
        let pipeline = pipeline(dir.path(), linear_detector(), &sinks);

        let result = pipeline.run_source(source(4), "clip").await.unwrap();

        assert_eq!(result.succeeded_outputs(), 2);
        assert!(result.circle_video_path.is_none());
        assert!(result.line_video_path.is_none());
        let failed: Vec<ViewKind> = result.outputs.iter().filter(|o| !o.is_success()).map(|o| o.view).collect();
        assert_eq!(failed, vec![ViewKind::Circle, ViewKind::Line]);
        assert_eq!(result.warnings_of(WarningKind::Encode).count(), 2);
    }

    #[tokio::test]
    async fn test_cancel_before_first_frame() {
        let dir = TempDir::new().unwrap();
        let sinks = MemorySinkFactory::new().persist_last_frame();
        let (cancel_tx, cancel_rx) = watch::channel(true);
        let mut detector = ready_detector();
        detector.expect_detect().never();
        let pipeline = pipeline(dir.path(), detector, &sinks).with_cancel(cancel_rx);

        let err = pipeline.run_source(source(5), "clip").await.unwrap_err();

        assert!(matches!(err, MediaError::Cancelled));
        assert_eq!(pipeline.state(), PipelineState::Aborted);
        for view in ViewKind::ALL {
            assert!(sinks.was_aborted(view));
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        drop(cancel_tx);
    }

    #[tokio::test]
    async fn test_cancel_mid_run_discards_outputs() {
        let dir = TempDir::new().unwrap();
        let sinks = MemorySinkFactory::new().persist_last_frame();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let mut detector = ready_detector();
        detector.expect_detect().returning(move |frame: &Frame| {
            if frame.index() == 3 {
                let _ = cancel_tx.send(true);
            }
            Ok(vec![person_at(frame.index() as f64 * 10.0, 40.0)])
        });
        let pipeline = pipeline(dir.path(), detector, &sinks).with_cancel(cancel_rx);

        let err = pipeline.run_source(source(10), "clip").await.unwrap_err();

        assert!(matches!(err, MediaError::Cancelled));
        assert_eq!(sinks.frame_count(ViewKind::Line), 4);
        for view in ViewKind::ALL {
            assert!(sinks.was_aborted(view));
            assert!(!sinks.was_finished(view));
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_detection_failure_aborts_run() {
        let dir = TempDir::new().unwrap();
        let sinks = MemorySinkFactory::new();
        let mut detector = ready_detector();
        detector.expect_detect().returning(|frame: &Frame| {
            if frame.index() == 2 {
                Err(MediaError::detection_failed("inference failed"))
            } else {
                Ok(Vec::new())
            }
        });
        let pipeline = pipeline(dir.path(), detector, &sinks);

        let err = pipeline.run_source(source(5), "clip").await.unwrap_err();

        assert!(matches!(err, MediaError::DetectionFailed(_)));
        assert!(ViewKind::ALL.iter().all(|v| sinks.was_aborted(*v)));
    }

    #[tokio::test]
    async fn test_repeated_runs_are_deterministic() {
        async fn run_once() -> (ExportRecord, Vec<u32>) {
            let dir = TempDir::new().unwrap();
            let sinks = MemorySinkFactory::new();
            let mut detector = ready_detector();
            detector.expect_detect().returning(|frame: &Frame| {
                let t = frame.index() as f64;
                Ok(vec![
                    person_at(80.0 - t * 3.0, 50.0),
                    person_at(20.0 + t * 3.0, 50.0),
                    person_at(50.0, 30.0 + t),
                ])
            });
            let result = pipeline(dir.path(), detector, &sinks)
                .run_source(source(12), "clip")
                .await
                .unwrap();
            let ids = result.summaries.iter().map(|s| s.track_id).collect();
            (result.export_record, ids)
        }

        let (first, first_ids) = run_once().await;
        let (second, second_ids) = run_once().await;
        assert_eq!(first, second);
        assert_eq!(first_ids, second_ids);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_persisted_outputs_use_view_names() {
        let dir = TempDir::new().unwrap();
        let sinks = MemorySinkFactory::new().persist_last_frame();
        let pipeline = pipeline(dir.path(), linear_detector(), &sinks);

        let result = pipeline.run_source(source(2), "match").await.unwrap();

        for view in ViewKind::ALL {
            let expected = dir.path().join(format!("match_{}.png", view));
            assert_eq!(result.video_path(view), Some(&expected));
            assert!(expected.exists());
        }
    }

    #[test]
    fn test_output_stem() {
        assert_eq!(output_stem(Path::new("/uploads/final.match.mkv")), "final.match");
        assert_eq!(output_stem(Path::new("/")), "video");
    }
}

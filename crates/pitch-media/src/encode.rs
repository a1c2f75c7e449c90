//! Per-view frame sinks.
//!
//! Each view gets its own sink. Frames enter in strictly increasing index
//! order; `finish` promotes the output to its final path, `abort` removes
//! every trace of it.

use async_trait::async_trait;
use image::{ImageFormat, RgbImage};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use pitch_models::{EncodingConfig, ViewKind};

use crate::command::{drain_stderr, FfmpegCommand};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{discard_file, partial_path, promote_file};
use crate::source::StreamInfo;

/// Destination for one view's frames.
#[async_trait]
pub trait FrameSink: Send {
    fn view(&self) -> ViewKind;

    async fn write(&mut self, image: &RgbImage) -> MediaResult<()>;

    /// Complete the output and return its final path.
    async fn finish(self: Box<Self>) -> MediaResult<PathBuf>;

    /// Stop writing and remove any partial output.
    async fn abort(self: Box<Self>);
}

/// Opens one sink per view.
#[async_trait]
pub trait SinkFactory: Send + Sync {
    /// File extension of the outputs this factory produces.
    fn extension(&self) -> &str;

    async fn open(&self, view: ViewKind, path: &Path, info: &StreamInfo) -> MediaResult<Box<dyn FrameSink>>;
}

/// Muxer name for a container extension.
fn muxer_for(container: &str) -> &str {
    match container {
        "mkv" => "matroska",
        "mov" => "mov",
        other => other,
    }
}

/// Encodes views with FFmpeg using one [`EncodingConfig`] for all of them.
#[derive(Debug, Clone, Default)]
pub struct FfmpegSinkFactory {
    encoding: EncodingConfig,
}

impl FfmpegSinkFactory {
    pub fn new(encoding: EncodingConfig) -> Self {
        Self { encoding }
    }

    fn encoder_command(&self, part: &Path, info: &StreamInfo) -> FfmpegCommand {
        FfmpegCommand::encode_from_rgb(part, info.width, info.height, info.fps)
            .output_args(self.encoding.to_ffmpeg_args_for_size(info.width, info.height))
            .format(muxer_for(&self.encoding.container))
    }
}

#[async_trait]
impl SinkFactory for FfmpegSinkFactory {
    fn extension(&self) -> &str {
        &self.encoding.container
    }

    async fn open(&self, view: ViewKind, path: &Path, info: &StreamInfo) -> MediaResult<Box<dyn FrameSink>> {
        let (width, height) = (info.width, info.height);
        let part = partial_path(path);

        let mut child = self
            .encoder_command(&part, info)
            .spawn()
            .map_err(|e| MediaError::encode(view, e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::encode(view, "failed to capture encoder stdin"))?;
        let stderr_task = child.stderr.take().map(|stderr| drain_stderr(stderr, view.as_str()));

        debug!(%view, path = %part.display(), width, height, fps = info.fps, "Opened encoder");

        Ok(Box::new(FfmpegSink {
            view,
            final_path: path.to_path_buf(),
            part_path: part,
            frame_size: (width, height),
            child,
            stdin: Some(stdin),
            stderr_task,
            frames: 0,
        }))
    }
}

struct FfmpegSink {
    view: ViewKind,
    final_path: PathBuf,
    part_path: PathBuf,
    frame_size: (u32, u32),
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_task: Option<JoinHandle<String>>,
    frames: u64,
}

impl FfmpegSink {
    async fn collect_stderr(&mut self) -> Option<String> {
        let task = self.stderr_task.take()?;
        task.await.ok().filter(|s| !s.is_empty())
    }
}

#[async_trait]
impl FrameSink for FfmpegSink {
    fn view(&self) -> ViewKind {
        self.view
    }

    async fn write(&mut self, image: &RgbImage) -> MediaResult<()> {
        if image.dimensions() != self.frame_size {
            return Err(MediaError::encode(
                self.view,
                format!(
                    "frame is {}x{}, encoder expects {}x{}",
                    image.width(),
                    image.height(),
                    self.frame_size.0,
                    self.frame_size.1
                ),
            ));
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::encode(self.view, "encoder input already closed"))?;
        stdin
            .write_all(image.as_raw())
            .await
            .map_err(|e| MediaError::encode(self.view, format!("write failed: {}", e)))?;

        self.frames += 1;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> MediaResult<PathBuf> {
        // Closing stdin signals end of input
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }

        let status = self.child.wait().await;
        let stderr = self.collect_stderr().await;

        match status {
            Ok(status) if status.success() => {}
            Ok(status) => {
                discard_file(&self.part_path).await;
                let detail = stderr.unwrap_or_else(|| format!("exit code {:?}", status.code()));
                return Err(MediaError::encode(self.view, format!("encoder failed: {}", detail.trim())));
            }
            Err(e) => {
                discard_file(&self.part_path).await;
                return Err(MediaError::encode(self.view, e.to_string()));
            }
        }

        promote_file(&self.part_path, &self.final_path)
            .await
            .map_err(|e| MediaError::encode(self.view, format!("failed to move output: {}", e)))?;

        info!(view = %self.view, frames = self.frames, path = %self.final_path.display(), "Encoded view");
        Ok(self.final_path.clone())
    }

    async fn abort(mut self: Box<Self>) {
        self.stdin = None;
        let _ = self.child.kill().await;
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        discard_file(&self.part_path).await;
        debug!(view = %self.view, frames = self.frames, "Aborted encoder");
    }
}

/// Where a [`MemorySinkFactory`] should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFailure {
    Open,
    /// Fail writing the frame with this zero-based write count
    Write(u64),
    Finish,
}

/// Frames and outcomes recorded per view.
#[derive(Debug, Default)]
pub struct RecordedView {
    /// Frames received; only the latest one when persisting previews
    pub frames: Vec<RgbImage>,
    pub written: u64,
    pub finished: bool,
    pub aborted: bool,
}

/// Keeps frames in memory instead of encoding them.
///
/// With [`persist_last_frame`](Self::persist_last_frame) the final frame of
/// each view is written to the output path as a PNG on finish, which makes
/// it usable as a preview run that skips video encoding.
#[derive(Debug, Clone, Default)]
pub struct MemorySinkFactory {
    recorded: Arc<Mutex<BTreeMap<ViewKind, RecordedView>>>,
    failures: BTreeMap<ViewKind, SinkFailure>,
    persist: bool,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make one view's sink fail at the given point.
    pub fn fail(mut self, view: ViewKind, failure: SinkFailure) -> Self {
        self.failures.insert(view, failure);
        self
    }

    pub fn persist_last_frame(mut self) -> Self {
        self.persist = true;
        self
    }

    /// Number of frames a view received.
    pub fn frame_count(&self, view: ViewKind) -> usize {
        self.with_recorded(|r| r.get(&view).map_or(0, |v| v.written as usize))
    }

    /// Copy of the frames a view received.
    pub fn frames(&self, view: ViewKind) -> Vec<RgbImage> {
        self.with_recorded(|r| r.get(&view).map(|v| v.frames.clone()).unwrap_or_default())
    }

    pub fn was_finished(&self, view: ViewKind) -> bool {
        self.with_recorded(|r| r.get(&view).is_some_and(|v| v.finished))
    }

    pub fn was_aborted(&self, view: ViewKind) -> bool {
        self.with_recorded(|r| r.get(&view).is_some_and(|v| v.aborted))
    }

    fn with_recorded<T>(&self, f: impl FnOnce(&BTreeMap<ViewKind, RecordedView>) -> T) -> T {
        match self.recorded.lock() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl SinkFactory for MemorySinkFactory {
    fn extension(&self) -> &str {
        if self.persist {
            "png"
        } else {
            "mp4"
        }
    }

    async fn open(&self, view: ViewKind, path: &Path, _info: &StreamInfo) -> MediaResult<Box<dyn FrameSink>> {
        let failure = self.failures.get(&view).copied();
        if failure == Some(SinkFailure::Open) {
            return Err(MediaError::encode(view, "injected open failure"));
        }

        if let Ok(mut recorded) = self.recorded.lock() {
            recorded.insert(view, RecordedView::default());
        }

        Ok(Box::new(MemorySink {
            view,
            path: path.to_path_buf(),
            recorded: Arc::clone(&self.recorded),
            failure,
            persist: self.persist,
            writes: 0,
        }))
    }
}

struct MemorySink {
    view: ViewKind,
    path: PathBuf,
    recorded: Arc<Mutex<BTreeMap<ViewKind, RecordedView>>>,
    failure: Option<SinkFailure>,
    persist: bool,
    writes: u64,
}

impl MemorySink {
    fn update(&self, f: impl FnOnce(&mut RecordedView)) {
        let mut recorded = match self.recorded.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(recorded.entry(self.view).or_default());
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    fn view(&self) -> ViewKind {
        self.view
    }

    async fn write(&mut self, image: &RgbImage) -> MediaResult<()> {
        if self.failure == Some(SinkFailure::Write(self.writes)) {
            return Err(MediaError::encode(self.view, "injected write failure"));
        }
        self.writes += 1;
        let image = image.clone();
        let keep_last_only = self.persist;
        self.update(|view| {
            if keep_last_only {
                view.frames.clear();
            }
            view.frames.push(image);
            view.written += 1;
        });
        Ok(())
    }

    async fn finish(self: Box<Self>) -> MediaResult<PathBuf> {
        if self.failure == Some(SinkFailure::Finish) {
            return Err(MediaError::encode(self.view, "injected finish failure"));
        }

        if self.persist {
            if let Some(image) = self.with_last_frame() {
                let view = self.view;
                let part = partial_path(&self.path);
                let target = part.clone();
                tokio::task::spawn_blocking(move || image.save_with_format(&target, ImageFormat::Png))
                    .await
                    .map_err(|e| MediaError::encode(view, e.to_string()))?
                    .map_err(|e| MediaError::encode(view, e.to_string()))?;
                promote_file(&part, &self.path)
                    .await
                    .map_err(|e| MediaError::encode(view, e.to_string()))?;
            }
        }

        self.update(|view| view.finished = true);
        Ok(self.path.clone())
    }

    async fn abort(self: Box<Self>) {
        self.update(|view| view.aborted = true);
    }
}

impl MemorySink {
    fn with_last_frame(&self) -> Option<RgbImage> {
        let recorded = match self.recorded.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        recorded.get(&self.view).and_then(|v| v.frames.last().cloned())
    }
}

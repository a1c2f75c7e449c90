//! FFmpeg command builder for the raw-frame pipes.
//!
//! Both ends of the pipeline talk to FFmpeg over `rawvideo` RGB24 pipes:
//! the decoder writes frames to stdout, each view encoder reads them from
//! stdin.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Pipe endpoint understood by FFmpeg.
pub const PIPE: &str = "-";

/// One `ffmpeg` invocation: `-i <input>` plus arguments on either side.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    before_input: Vec<String>,
    after_input: Vec<String>,
    log_level: &'static str,
}

impl FfmpegCommand {
    /// `input` or `output` may be [`PIPE`].
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            before_input: Vec::new(),
            after_input: Vec::new(),
            log_level: "error",
        }
    }

    /// Decode the first video stream of `input` to RGB24 frames on stdout.
    ///
    /// `showinfo` logs each delivered frame's timestamp on stderr, which
    /// needs the `info` log level.
    pub fn decode_to_rgb(input: impl AsRef<Path>) -> Self {
        Self::new(input, PIPE)
            .log_level("info")
            .input_args(["-nostats"])
            .output_args(["-map", "0:v:0", "-vsync", "passthrough", "-vf", "showinfo"])
            .output_args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
    }

    /// Encode RGB24 frames read from stdin into `output`.
    pub fn encode_from_rgb(output: impl AsRef<Path>, width: u32, height: u32, fps: f64) -> Self {
        let size = format!("{}x{}", width, height);
        let rate = format_rate(fps);
        Self::new(PIPE, output)
            .input_args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .input_args(["-s", size.as_str(), "-r", rate.as_str()])
    }

    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.before_input.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after_input.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn log_level(mut self, level: &'static str) -> Self {
        self.log_level = level;
        self
    }

    /// Force the output muxer; `.part` names carry no usable extension.
    pub fn format(self, muxer: &str) -> Self {
        self.output_args(["-f", muxer])
    }

    fn reads_stdin(&self) -> bool {
        self.input.as_os_str() == PIPE
    }

    fn writes_stdout(&self) -> bool {
        self.output.as_os_str() == PIPE
    }

    /// Full argument list, without the `ffmpeg` program name.
    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-y".into(), "-v".into(), self.log_level.into()];
        if !self.reads_stdin() {
            args.push("-nostdin".into());
        }
        args.extend(self.before_input.iter().cloned());
        args.extend(["-i".to_string(), self.input.to_string_lossy().into_owned()]);
        args.extend(self.after_input.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }

    /// Spawn FFmpeg with its pipe ends attached.
    ///
    /// The child is killed when its handle is dropped, so an early return
    /// anywhere in the caller never leaks a process.
    pub fn spawn(&self) -> MediaResult<Child> {
        check_ffmpeg()?;

        let args = self.build_args();
        debug!("Spawning FFmpeg: ffmpeg {}", args.join(" "));

        let stdin = if self.reads_stdin() {
            Stdio::piped()
        } else {
            Stdio::null()
        };
        let stdout = if self.writes_stdout() {
            Stdio::piped()
        } else {
            Stdio::null()
        };

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::ffmpeg_failed(format!("failed to spawn ffmpeg: {}", e), None, None))?;

        Ok(child)
    }
}

/// Collect a child's stderr in the background, logging each line.
///
/// FFmpeg blocks once its stderr pipe fills, so every spawned child must
/// have its stderr drained.
pub fn drain_stderr(stderr: ChildStderr, context: &'static str) -> JoinHandle<String> {
    tokio::spawn(async move {
        let mut collected = String::new();
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            warn!(target: "ffmpeg", context, "{}", line);
            collected.push_str(&line);
            collected.push('\n');
        }
        collected
    })
}

/// Format a frame rate for `-r` without losing NTSC rates like 29.97.
fn format_rate(fps: f64) -> String {
    if (fps - fps.round()).abs() < 1e-9 {
        format!("{}", fps.round() as u64)
    } else {
        format!("{:.6}", fps)
    }
}

/// Locate `ffmpeg` on `PATH`.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Locate `ffprobe` on `PATH`.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

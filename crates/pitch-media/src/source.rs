//! Frame sources: sequential decoded frames from a container.

use async_trait::async_trait;
use image::RgbImage;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::frame::{rgb_frame_len, Frame};
use crate::probe::probe_video;

/// Stream properties known once the source is open.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Frame count reported by the container
    pub expected_frames: u64,
}

/// Result of one sequential read.
#[derive(Debug)]
pub enum SourceEvent {
    Frame(Frame),
    /// A frame slot that could not be decoded; the next read continues after it.
    Corrupt { index: u64, reason: String },
    EndOfStream,
}

/// Sequential frame reader over one opened container.
#[async_trait]
pub trait FrameSource: Send {
    fn info(&self) -> &StreamInfo;

    /// Read the next frame slot. Returns `EndOfStream` forever once exhausted.
    async fn read(&mut self) -> MediaResult<SourceEvent>;

    /// Release the decoder. Safe to call more than once.
    async fn close(&mut self);
}

/// Leading bytes of the containers accepted for analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// ISO base media (MP4, MOV)
    IsoBmff,
    /// Matroska (MKV)
    Matroska,
    /// RIFF AVI
    Avi,
}

/// Inspect a file's header before handing it to the decoder.
///
/// Rejects truncated and foreign files up front, without spawning ffprobe.
pub async fn sniff_container(path: &Path) -> MediaResult<ContainerKind> {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MediaError::media_open(path, "file not found"));
        }
        Err(e) => return Err(MediaError::media_open(path, e.to_string())),
    };

    let mut header = [0u8; 12];
    let len = read_full(&mut file, &mut header).await?;
    classify_header(&header[..len]).ok_or_else(|| MediaError::media_open(path, "unrecognized container header"))
}

fn classify_header(header: &[u8]) -> Option<ContainerKind> {
    const ISO_BOXES: [&[u8; 4]; 6] = [b"ftyp", b"moov", b"mdat", b"wide", b"free", b"skip"];

    if header.len() >= 4 && header[..4] == [0x1A, 0x45, 0xDF, 0xA3] {
        return Some(ContainerKind::Matroska);
    }
    if header.len() >= 12 && &header[..4] == b"RIFF" && &header[8..12] == b"AVI " {
        return Some(ContainerKind::Avi);
    }
    if header.len() >= 8 && ISO_BOXES.iter().any(|b| &header[4..8] == *b) {
        return Some(ContainerKind::IsoBmff);
    }
    None
}

/// Longest wait for the decoder's timestamp line of a frame already read.
const SLOT_WAIT: Duration = Duration::from_secs(5);

/// Maps decoder timestamps onto container frame slots.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SlotClock {
    start_time: f64,
    fps: f64,
}

impl SlotClock {
    fn slot(&self, pts_time: f64) -> u64 {
        ((pts_time - self.start_time) * self.fps).round().max(0.0) as u64
    }
}

/// Slot of the frame a `showinfo` stderr line describes.
///
/// `None` for any other line, `Some(None)` for a frame line without a
/// usable timestamp.
fn showinfo_slot(line: &str, clock: &SlotClock) -> Option<Option<u64>> {
    if !line.contains("Parsed_showinfo") {
        return None;
    }
    let (_, rest) = line.split_once("pts_time:")?;
    let pts_time = rest
        .split_whitespace()
        .next()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|t| t.is_finite());
    Some(pts_time.map(|t| clock.slot(t)))
}

/// Send each `showinfo` frame slot to `slots` and log the remaining lines.
///
/// Returns the collected non-`showinfo` output.
fn drain_decoder_log(
    stderr: ChildStderr,
    clock: SlotClock,
    slots: mpsc::UnboundedSender<Option<u64>>,
) -> JoinHandle<String> {
    tokio::spawn(async move {
        let mut collected = String::new();
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(slot) = showinfo_slot(&line, &clock) {
                let _ = slots.send(slot);
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }
            if line.to_ascii_lowercase().contains("error") {
                warn!(target: "ffmpeg", context = "decode", "{}", line);
            } else {
                debug!(target: "ffmpeg", context = "decode", "{}", line);
            }
            collected.push_str(&line);
            collected.push('\n');
        }
        collected
    })
}

/// Slot accounting over a packed RGB24 byte stream.
///
/// Frames carry their container slot. With decoder slot reports attached
/// ([`RawFrameReader::with_slots`]) a jump in slots yields `Corrupt` events
/// for the skipped indices; without them frames are numbered in delivery
/// order. A truncated trailing frame and any shortfall against
/// `expected_frames` are reported as `Corrupt` as well.
pub struct RawFrameReader<R> {
    reader: Option<R>,
    width: u32,
    height: u32,
    frame_len: usize,
    expected_frames: u64,
    slots: Option<mpsc::UnboundedReceiver<Option<u64>>>,
    /// Lowest slot not yet reported
    next_index: u64,
    pending: VecDeque<SourceEvent>,
}

impl<R: AsyncRead + Unpin + Send> RawFrameReader<R> {
    pub fn new(reader: R, width: u32, height: u32, expected_frames: u64) -> Self {
        Self {
            reader: Some(reader),
            width,
            height,
            frame_len: rgb_frame_len(width, height),
            expected_frames,
            slots: None,
            next_index: 0,
            pending: VecDeque::new(),
        }
    }

    /// Number frames by the slots received here, one per delivered frame.
    pub fn with_slots(mut self, slots: mpsc::UnboundedReceiver<Option<u64>>) -> Self {
        self.slots = Some(slots);
        self
    }

    /// The byte stream has ended or the reader was closed.
    pub fn is_drained(&self) -> bool {
        self.reader.is_none()
    }

    pub fn close(&mut self) {
        self.reader = None;
        self.slots = None;
        self.pending.clear();
    }

    /// Next event; `EndOfStream` forever once everything is reported.
    pub async fn read(&mut self) -> MediaResult<SourceEvent> {
        if self.pending.is_empty() {
            self.fill().await?;
        }
        Ok(self.pending.pop_front().unwrap_or(SourceEvent::EndOfStream))
    }

    async fn fill(&mut self) -> MediaResult<()> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(());
        };
        let mut buf = vec![0u8; self.frame_len];
        let len = read_full(reader, &mut buf).await?;

        if len == self.frame_len {
            let slot = self.frame_slot().await;
            self.skip_to(slot);
            self.next_index = slot + 1;
            let frame = Frame::from_rgb(slot, self.width, self.height, buf)?;
            self.pending.push_back(SourceEvent::Frame(frame));
            return Ok(());
        }

        self.reader = None;
        self.slots = None;

        if len > 0 {
            // The partial frame occupies a slot of its own
            self.pending.push_back(SourceEvent::Corrupt {
                index: self.next_index,
                reason: format!("truncated frame: {} of {} bytes", len, self.frame_len),
            });
            self.next_index += 1;
        }
        if self.next_index < self.expected_frames {
            warn!(
                reached = self.next_index,
                expected = self.expected_frames,
                "Decoder ended early"
            );
            self.skip_to(self.expected_frames);
        }
        Ok(())
    }

    /// Queue `Corrupt` events for every unreported slot below `slot`.
    fn skip_to(&mut self, slot: u64) {
        for index in self.next_index..slot {
            self.pending.push_back(SourceEvent::Corrupt {
                index,
                reason: "frame dropped by decoder".to_string(),
            });
        }
        self.next_index = self.next_index.max(slot);
    }

    async fn frame_slot(&mut self) -> u64 {
        let fallback = self.next_index;
        let Some(slots) = self.slots.as_mut() else {
            return fallback;
        };
        match tokio::time::timeout(SLOT_WAIT, slots.recv()).await {
            // Never move backwards, even on a non-monotonic timestamp
            Ok(Some(Some(slot))) => slot.max(fallback),
            Ok(Some(None)) => fallback,
            Ok(None) | Err(_) => {
                warn!("Decoder stopped reporting timestamps; numbering frames in delivery order");
                self.slots = None;
                fallback
            }
        }
    }
}

/// Frame source backed by an `ffmpeg` child decoding to RGB24 on stdout.
pub struct FfmpegFrameSource {
    path: PathBuf,
    info: StreamInfo,
    child: Option<Child>,
    stderr_task: Option<JoinHandle<String>>,
    frames: RawFrameReader<ChildStdout>,
    exhausted: bool,
}

impl FfmpegFrameSource {
    /// Open a container, read its stream metadata and start the decoder.
    pub async fn open(path: impl AsRef<Path>) -> MediaResult<Self> {
        let path = path.as_ref().to_path_buf();

        let kind = sniff_container(&path).await?;
        debug!(path = %path.display(), ?kind, "Container header accepted");

        let video = probe_video(&path).await.map_err(|e| match e {
            MediaError::FfprobeNotFound | MediaError::MediaOpen { .. } => e,
            other => MediaError::media_open(&path, other.to_string()),
        })?;

        if video.width == 0 || video.height == 0 {
            return Err(MediaError::media_open(&path, "video stream has zero dimensions"));
        }
        if video.frame_count == 0 {
            return Err(MediaError::media_open(&path, "video stream has no frames"));
        }

        let info = StreamInfo {
            width: video.width,
            height: video.height,
            fps: video.fps,
            expected_frames: video.frame_count,
        };

        let mut child = FfmpegCommand::decode_to_rgb(&path).spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("Failed to capture FFmpeg stdout", None, None))?;

        let clock = SlotClock {
            start_time: video.start_time,
            fps: info.fps,
        };
        let (slot_tx, slot_rx) = mpsc::unbounded_channel();
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| drain_decoder_log(stderr, clock, slot_tx));
        let frames = RawFrameReader::new(stdout, info.width, info.height, info.expected_frames).with_slots(slot_rx);

        info!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            fps = info.fps,
            frames = info.expected_frames,
            codec = %video.codec,
            "Opened video"
        );

        Ok(Self {
            path,
            info,
            child: Some(child),
            stderr_task,
            frames,
            exhausted: false,
        })
    }

    /// Reap the decoder once its stdout has ended.
    async fn reap(&mut self) {
        if let Some(mut child) = self.child.take() {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    warn!(path = %self.path.display(), code = ?status.code(), "Decoder exited with non-zero status");
                }
                Err(e) => warn!(path = %self.path.display(), "Failed to reap decoder: {}", e),
                _ => {}
            }
        }
        if let Some(task) = self.stderr_task.take() {
            let _ = task.await;
        }
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    async fn read(&mut self) -> MediaResult<SourceEvent> {
        let event = self.frames.read().await?;

        if self.frames.is_drained() && self.child.is_some() {
            self.reap().await;
        }
        if matches!(event, SourceEvent::EndOfStream) && !self.exhausted {
            self.exhausted = true;
            debug!(path = %self.path.display(), "End of stream");
        }
        Ok(event)
    }

    async fn close(&mut self) {
        self.frames.close();
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        self.exhausted = true;
    }
}

/// Read until `buf` is full or the reader hits EOF. Returns the bytes read.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> MediaResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// One scripted slot of a [`MemoryFrameSource`].
#[derive(Debug, Clone)]
pub enum MemorySlot {
    Frame(RgbImage),
    Corrupt(String),
}

/// Frame source over frames already in memory.
pub struct MemoryFrameSource {
    info: StreamInfo,
    slots: VecDeque<MemorySlot>,
    next_index: u64,
}

impl MemoryFrameSource {
    /// Build a source from decoded images. All images must share one size.
    pub fn new(fps: f64, images: Vec<RgbImage>) -> MediaResult<Self> {
        Self::from_slots(fps, images.into_iter().map(MemorySlot::Frame).collect())
    }

    pub fn from_slots(fps: f64, slots: Vec<MemorySlot>) -> MediaResult<Self> {
        let origin = Path::new("<memory>");
        let (width, height) = slots
            .iter()
            .find_map(|slot| match slot {
                MemorySlot::Frame(image) => Some(image.dimensions()),
                MemorySlot::Corrupt(_) => None,
            })
            .ok_or_else(|| MediaError::media_open(origin, "no decodable frames"))?;

        if width == 0 || height == 0 {
            return Err(MediaError::media_open(origin, "video stream has zero dimensions"));
        }
        let mismatched = slots.iter().any(|slot| match slot {
            MemorySlot::Frame(image) => image.dimensions() != (width, height),
            MemorySlot::Corrupt(_) => false,
        });
        if mismatched {
            return Err(MediaError::media_open(origin, "frames differ in size"));
        }

        Ok(Self {
            info: StreamInfo {
                width,
                height,
                fps,
                expected_frames: slots.len() as u64,
            },
            slots: slots.into(),
            next_index: 0,
        })
    }

    /// Replace the slot at `index` with an undecodable one.
    pub fn corrupt_at(mut self, index: usize, reason: impl Into<String>) -> Self {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = MemorySlot::Corrupt(reason.into());
        }
        self
    }
}

#[async_trait]
impl FrameSource for MemoryFrameSource {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    async fn read(&mut self) -> MediaResult<SourceEvent> {
        let Some(slot) = self.slots.pop_front() else {
            return Ok(SourceEvent::EndOfStream);
        };
        let index = self.next_index;
        self.next_index += 1;

        Ok(match slot {
            MemorySlot::Frame(image) => SourceEvent::Frame(Frame::new(index, image)),
            MemorySlot::Corrupt(reason) => SourceEvent::Corrupt { index, reason },
        })
    }

    async fn close(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn blank(width: u32, height: u32) -> RgbImage {
        RgbImage::new(width, height)
    }

    #[test]
    fn test_classify_header() {
        let mut mp4 = [0u8; 12];
        mp4[4..8].copy_from_slice(b"ftyp");
        assert_eq!(classify_header(&mp4), Some(ContainerKind::IsoBmff));

        assert_eq!(
            classify_header(&[0x1A, 0x45, 0xDF, 0xA3, 0, 0, 0, 0]),
            Some(ContainerKind::Matroska)
        );
        assert_eq!(classify_header(b"RIFF\0\0\0\0AVI "), Some(ContainerKind::Avi));
        assert_eq!(classify_header(b"RIFF\0\0\0\0WAVE"), None);
        assert_eq!(classify_header(b"garbage!"), None);
        assert_eq!(classify_header(&[]), None);
    }

    #[tokio::test]
    async fn test_corrupt_header_fails_to_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.mp4");
        tokio::fs::write(&path, b"this is not a video container")
            .await
            .unwrap();

        let err = FfmpegFrameSource::open(&path).await.err().unwrap();
        assert!(matches!(err, MediaError::MediaOpen { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_fails_to_open() {
        let dir = TempDir::new().unwrap();
        let err = FfmpegFrameSource::open(dir.path().join("absent.mkv"))
            .await
            .err()
            .unwrap();
        assert!(err.is_media_open());
    }

    #[tokio::test]
    async fn test_read_full_stops_at_eof() {
        let data = [1u8, 2, 3, 4, 5];
        let mut reader: &[u8] = &data;
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut reader, &mut buf).await.unwrap(), 5);
        assert_eq!(read_full(&mut reader, &mut buf).await.unwrap(), 0);
    }

    fn raw_frames(frames: usize, extra_bytes: usize) -> Vec<u8> {
        vec![7u8; rgb_frame_len(4, 2) * frames + extra_bytes]
    }

    fn describe(event: &SourceEvent) -> String {
        match event {
            SourceEvent::Frame(frame) => format!("frame {}", frame.index()),
            SourceEvent::Corrupt { index, .. } => format!("corrupt {}", index),
            SourceEvent::EndOfStream => "end".to_string(),
        }
    }

    async fn read_n<R: AsyncRead + Unpin + Send>(reader: &mut RawFrameReader<R>, n: usize) -> Vec<String> {
        let mut events = Vec::new();
        for _ in 0..n {
            events.push(describe(&reader.read().await.unwrap()));
        }
        events
    }

    #[tokio::test]
    async fn test_raw_reader_complete_stream() {
        let data = raw_frames(3, 0);
        let mut reader = RawFrameReader::new(data.as_slice(), 4, 2, 3);

        assert_eq!(read_n(&mut reader, 5).await, ["frame 0", "frame 1", "frame 2", "end", "end"]);
        assert!(reader.is_drained());
    }

    #[tokio::test]
    async fn test_raw_reader_truncated_frame_and_shortfall() {
        let data = raw_frames(2, 5);
        let mut reader = RawFrameReader::new(data.as_slice(), 4, 2, 5);

        assert_eq!(read_n(&mut reader, 2).await, ["frame 0", "frame 1"]);
        match reader.read().await.unwrap() {
            SourceEvent::Corrupt { index, reason } => {
                assert_eq!(index, 2);
                assert!(reason.contains("5 of 24 bytes"), "{reason}");
            }
            other => panic!("expected truncated slot, got {}", describe(&other)),
        }
        assert_eq!(read_n(&mut reader, 3).await, ["corrupt 3", "corrupt 4", "end"]);
    }

    #[tokio::test]
    async fn test_raw_reader_leaves_gaps_at_decoder_slots() {
        let data = raw_frames(3, 0);
        let (tx, rx) = mpsc::unbounded_channel();
        for slot in [Some(0), Some(2), None] {
            tx.send(slot).unwrap();
        }
        drop(tx);
        let mut reader = RawFrameReader::new(data.as_slice(), 4, 2, 5).with_slots(rx);

        // Slot 1 was skipped by the decoder; a frame without a timestamp takes the next slot
        assert_eq!(
            read_n(&mut reader, 6).await,
            ["frame 0", "corrupt 1", "frame 2", "frame 3", "corrupt 4", "end"]
        );
    }

    #[tokio::test]
    async fn test_raw_reader_falls_back_to_delivery_order() {
        let data = raw_frames(2, 0);
        let (tx, rx) = mpsc::unbounded_channel::<Option<u64>>();
        drop(tx);
        let mut reader = RawFrameReader::new(data.as_slice(), 4, 2, 2).with_slots(rx);

        assert_eq!(read_n(&mut reader, 3).await, ["frame 0", "frame 1", "end"]);
    }

    #[tokio::test]
    async fn test_raw_reader_close_ends_stream() {
        let data = raw_frames(1, 0);
        let mut reader = RawFrameReader::new(data.as_slice(), 4, 2, 4);
        reader.close();

        assert_eq!(read_n(&mut reader, 2).await, ["end", "end"]);
    }

    #[test]
    fn test_showinfo_slot() {
        let clock = SlotClock {
            start_time: 0.08,
            fps: 25.0,
        };
        let line = "[Parsed_showinfo_0 @ 0x55d1c0] n:   3 pts:  15360 pts_time:0.2     duration:  512";
        assert_eq!(showinfo_slot(line, &clock), Some(Some(3)));
        assert_eq!(
            showinfo_slot("[Parsed_showinfo_0 @ 0x55d1c0] n:   4 pts:NOPTS pts_time:NOPTS", &clock),
            Some(None)
        );
        assert_eq!(showinfo_slot("Stream #0:0: Video: h264", &clock), None);
        // Frames stamped before the stream start clamp to slot 0
        assert_eq!(clock.slot(0.0), 0);
    }

    #[tokio::test]
    async fn test_memory_source_reports_slots_in_order() {
        let mut source = MemoryFrameSource::new(25.0, vec![blank(8, 4); 3])
            .unwrap()
            .corrupt_at(1, "bad packet");

        assert_eq!(source.info().expected_frames, 3);
        assert!(matches!(source.read().await.unwrap(), SourceEvent::Frame(f) if f.index() == 0));
        assert!(matches!(
            source.read().await.unwrap(),
            SourceEvent::Corrupt { index: 1, .. }
        ));
        assert!(matches!(source.read().await.unwrap(), SourceEvent::Frame(f) if f.index() == 2));
        assert!(matches!(source.read().await.unwrap(), SourceEvent::EndOfStream));
        assert!(matches!(source.read().await.unwrap(), SourceEvent::EndOfStream));
    }

    #[test]
    fn test_memory_source_rejects_empty_and_mixed_sizes() {
        assert!(MemoryFrameSource::new(25.0, Vec::new()).is_err());
        assert!(MemoryFrameSource::new(25.0, vec![blank(0, 0)]).is_err());
        assert!(MemoryFrameSource::new(25.0, vec![blank(8, 4), blank(4, 8)]).is_err());
    }
}

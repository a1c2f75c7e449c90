#![deny(unreachable_patterns)]
//! Frame-by-frame analysis of sports match videos.
//!
//! This crate provides:
//! - FFmpeg decode/encode over raw RGB pipes, with ffprobe metadata
//! - Pluggable object detection (YOLOv8 on ONNX Runtime behind `onnx`)
//! - Greedy centroid tracking and per-track position history
//! - Four rendered views: main, circle, Voronoi and trajectory lines
//! - The Export Record and per-track summaries
//! - A cancellable pipeline tying it together with partial-success reporting

pub mod command;
pub mod config;
pub mod detection;
pub mod encode;
pub mod error;
pub mod export;
pub mod frame;
pub mod fs_utils;
pub mod metrics;
pub mod pipeline;
pub mod probe;
pub mod render;
pub mod source;
pub mod tracking;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand};
pub use config::{PipelineConfig, PitchConfig, TrackerConfig};
pub use detection::{BoundingBox, Detection, ObjectDetector, TrackedDetection, CLASS_PERSON, CLASS_SPORTS_BALL};
#[cfg(feature = "onnx")]
pub use detection::{YoloConfig, YoloDetector};
pub use encode::{FfmpegSinkFactory, FrameSink, MemorySinkFactory, SinkFactory, SinkFailure};
pub use error::{MediaError, MediaResult};
pub use export::{export, summarize};
pub use frame::Frame;
pub use pipeline::{Pipeline, PipelineState};
pub use probe::{probe_video, VideoInfo};
pub use render::{PitchProjection, RenderContext, ViewRenderer};
pub use source::{FfmpegFrameSource, FrameSource, MemoryFrameSource, RawFrameReader, SourceEvent, StreamInfo};
pub use tracking::{Track, TrackAccumulator, TrackTable};

// Re-export models used in the public API
pub use pitch_models::{AnalysisResult, EncodingConfig, ExportRecord, Position, RunId, ViewKind};

//! Caller-facing result of one analysis run.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{ExportRecord, RunId, ViewKind, ViewOutput};

/// Class of a recoverable problem recorded during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A single frame could not be decoded and was skipped
    FrameDecode,
    /// One view's encoder could not be opened, written or finished
    Encode,
}

/// A recoverable problem reported alongside successful outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineWarning {
    pub kind: WarningKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<ViewKind>,
    pub message: String,
}

impl PipelineWarning {
    pub fn frame_decode(frame_index: u64, message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::FrameDecode,
            frame_index: Some(frame_index),
            view: None,
            message: message.into(),
        }
    }

    pub fn encode(view: ViewKind, frame_index: Option<u64>, message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Encode,
            frame_index,
            view: Some(view),
            message: message.into(),
        }
    }
}

/// Per-track statistics derived from the track table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackSummary {
    pub track_id: u32,
    pub class_id: usize,
    pub label: String,
    pub first_frame: u64,
    pub last_frame: u64,
    pub observations: usize,
    /// Total path length in source pixels
    pub distance_px: f64,
    /// Mean speed in source pixels per second over the observed span
    pub mean_speed_px_per_sec: f64,
}

/// Frame accounting for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Frame count reported by the container
    pub expected_frames: u64,
    /// Frames decoded and processed
    pub frames_read: u64,
    /// Frames reported as undecodable
    pub frames_dropped: u64,
    pub detections: u64,
    pub tracks: usize,
    pub elapsed_ms: u64,
}

/// Result of a run that did not fail entirely.
///
/// `*_video_path` is `None` for views whose encoder failed; the matching
/// entry in `outputs` carries the error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub run_id: RunId,
    pub main_video_path: Option<PathBuf>,
    pub circle_video_path: Option<PathBuf>,
    pub voronoi_video_path: Option<PathBuf>,
    pub line_video_path: Option<PathBuf>,
    pub export_record: ExportRecord,
    pub outputs: Vec<ViewOutput>,
    pub warnings: Vec<PipelineWarning>,
    pub summaries: Vec<TrackSummary>,
    pub stats: RunStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Path of a view's output, if it succeeded.
    pub fn video_path(&self, view: ViewKind) -> Option<&PathBuf> {
        match view {
            ViewKind::Main => self.main_video_path.as_ref(),
            ViewKind::Circle => self.circle_video_path.as_ref(),
            ViewKind::Voronoi => self.voronoi_video_path.as_ref(),
            ViewKind::Line => self.line_video_path.as_ref(),
        }
    }

    pub fn succeeded_outputs(&self) -> usize {
        self.outputs.iter().filter(|o| o.is_success()).count()
    }

    /// Some view failed or some warning was recorded.
    pub fn is_partial(&self) -> bool {
        self.succeeded_outputs() < ViewKind::ALL.len() || !self.warnings.is_empty()
    }

    pub fn warnings_of(&self, kind: WarningKind) -> impl Iterator<Item = &PipelineWarning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExportEntry, Position};

    fn sample() -> AnalysisResult {
        let mut record = ExportRecord::new();
        record.push(ExportEntry {
            track_id: 1,
            position: Position::new(10.0, 20.0),
            frame_index: 0,
        });

        AnalysisResult {
            run_id: "run-1".parse().unwrap(),
            main_video_path: Some(PathBuf::from("/out/a_main.mp4")),
            circle_video_path: Some(PathBuf::from("/out/a_circle.mp4")),
            voronoi_video_path: None,
            line_video_path: Some(PathBuf::from("/out/a_line.mp4")),
            export_record: record,
            outputs: vec![
                ViewOutput::succeeded(ViewKind::Main, PathBuf::from("/out/a_main.mp4"), 1),
                ViewOutput::succeeded(ViewKind::Circle, PathBuf::from("/out/a_circle.mp4"), 1),
                ViewOutput::failed(ViewKind::Voronoi, 0, "boom"),
                ViewOutput::succeeded(ViewKind::Line, PathBuf::from("/out/a_line.mp4"), 1),
            ],
            warnings: vec![PipelineWarning::encode(ViewKind::Voronoi, None, "boom")],
            summaries: Vec::new(),
            stats: RunStats::default(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_caller_facing_keys() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["mainVideoPath"], "/out/a_main.mp4");
        assert!(json["voronoiVideoPath"].is_null());
        assert_eq!(json["exportRecord"]["1"][0]["frameIndex"], 0);
        assert_eq!(json["warnings"][0]["kind"], "encode");
        assert_eq!(json["warnings"][0]["view"], "voronoi");
        assert!(json["warnings"][0].get("frameIndex").is_none());
    }

    #[test]
    fn test_partial_success_accounting() {
        let result = sample();
        assert_eq!(result.succeeded_outputs(), 3);
        assert!(result.is_partial());
        assert!(result.video_path(ViewKind::Voronoi).is_none());
        assert_eq!(result.warnings_of(WarningKind::Encode).count(), 1);
    }
}

//! Rendered views and their per-run output status.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The four rendered views of one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    /// Boxes and labels drawn on the original frames
    Main,
    /// Object markers on an abstract pitch
    Circle,
    /// Nearest-object cell diagram on the abstract pitch
    Voronoi,
    /// Trajectory polylines on the abstract pitch
    Line,
}

impl ViewKind {
    /// All views, in output order.
    pub const ALL: [ViewKind; 4] = [
        ViewKind::Main,
        ViewKind::Circle,
        ViewKind::Voronoi,
        ViewKind::Line,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewKind::Main => "main",
            ViewKind::Circle => "circle",
            ViewKind::Voronoi => "voronoi",
            ViewKind::Line => "line",
        }
    }

    /// Output file name for this view, e.g. `match_voronoi.mp4`.
    pub fn file_name(&self, stem: &str, extension: &str) -> String {
        format!("{}_{}.{}", stem, self.as_str(), extension)
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one view's encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutputStatus {
    Succeeded,
    Failed,
}

/// Per-view output report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ViewOutput {
    pub view: ViewKind,
    pub status: OutputStatus,
    /// Final file path, present only when the view succeeded
    pub path: Option<PathBuf>,
    /// Number of frames written to this view
    pub frames_written: u64,
    /// Error description when the view failed
    pub error: Option<String>,
}

impl ViewOutput {
    pub fn succeeded(view: ViewKind, path: PathBuf, frames_written: u64) -> Self {
        Self {
            view,
            status: OutputStatus::Succeeded,
            path: Some(path),
            frames_written,
            error: None,
        }
    }

    pub fn failed(view: ViewKind, frames_written: u64, error: impl Into<String>) -> Self {
        Self {
            view,
            status: OutputStatus::Failed,
            path: None,
            frames_written,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutputStatus::Succeeded
    }
}

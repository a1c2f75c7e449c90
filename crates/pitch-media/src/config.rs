//! Configuration for the analysis pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use pitch_models::EncodingConfig;

use crate::detection::{CLASS_PERSON, CLASS_SPORTS_BALL};

/// Configuration for one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory receiving the four output videos (default: "output")
    pub output_dir: PathBuf,

    /// Detection filtering and association
    pub tracker: TrackerConfig,

    /// Abstract pitch canvas and marker styling
    pub pitch: PitchConfig,

    /// Encoder settings shared by all four views
    pub encoding: EncodingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            tracker: TrackerConfig::default(),
            pitch: PitchConfig::default(),
            encoding: EncodingConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

/// Detection filtering and track association settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    // === Detection ===
    /// Minimum detector confidence kept for association (default: 0.25)
    pub confidence_threshold: f32,

    /// COCO classes kept; `None` keeps every class (default: person, sports ball)
    pub class_filter: Option<Vec<usize>>,

    // === Association ===
    /// Maximum foot-point distance in pixels for a detection to continue a track (default: 80)
    pub max_match_distance: f64,

    /// Consecutive unmatched frames after which a track stops matching (default: 30)
    pub max_inactive_frames: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            class_filter: Some(vec![CLASS_PERSON, CLASS_SPORTS_BALL]),
            max_match_distance: 80.0,
            max_inactive_frames: 30,
        }
    }
}

impl TrackerConfig {
    /// Whether a class passes the filter.
    pub fn accepts_class(&self, class_id: usize) -> bool {
        self.class_filter
            .as_ref()
            .map_or(true, |classes| classes.contains(&class_id))
    }
}

/// Abstract pitch canvas used by the circle, Voronoi and line views.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    /// Canvas width in pixels (default: 1050, i.e. 10 px per metre)
    pub width: u32,

    /// Canvas height in pixels (default: 680)
    pub height: u32,

    /// Radius of player markers (default: 12)
    pub marker_radius: i32,

    /// Radius of the ball marker (default: 6)
    pub ball_radius: i32,

    /// Thickness of trajectory lines and box outlines (default: 2)
    pub line_thickness: u32,

    /// Integer scale of the built-in label font (default: 2)
    pub label_scale: u32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            width: 1050,
            height: 680,
            marker_radius: 12,
            ball_radius: 6,
            line_thickness: 2,
            label_scale: 2,
        }
    }
}

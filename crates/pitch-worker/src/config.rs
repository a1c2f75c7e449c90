//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;

use pitch_media::{PipelineConfig, TrackerConfig};
use pitch_models::EncodingConfig;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// YOLOv8 ONNX model
    pub model_path: PathBuf,
    /// Directory receiving the four rendered views
    pub output_dir: PathBuf,
    /// Minimum detector confidence kept for tracking
    pub confidence_threshold: f32,
    /// Association gate in source pixels
    pub max_match_distance: f64,
    /// Unmatched frames before a track goes inactive
    pub max_inactive_frames: u32,
    /// Square detector input size
    pub input_size: u32,
    pub crf: u8,
    pub preset: String,
    /// Encode with h264_nvenc
    pub use_nvenc: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let tracker = TrackerConfig::default();
        let encoding = EncodingConfig::default();
        Self {
            model_path: PathBuf::from("models/yolov8n.onnx"),
            output_dir: PathBuf::from("output"),
            confidence_threshold: tracker.confidence_threshold,
            max_match_distance: tracker.max_match_distance,
            max_inactive_frames: tracker.max_inactive_frames,
            input_size: 640,
            crf: encoding.crf,
            preset: encoding.preset,
            use_nvenc: false,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable lookup.
    ///
    /// Unset or unparsable values keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            model_path: lookup("PITCH_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            output_dir: lookup("PITCH_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            confidence_threshold: parse_or(&lookup, "PITCH_CONF_THRESHOLD", defaults.confidence_threshold),
            max_match_distance: parse_or(&lookup, "PITCH_MAX_MATCH_DISTANCE", defaults.max_match_distance),
            max_inactive_frames: parse_or(&lookup, "PITCH_MAX_INACTIVE_FRAMES", defaults.max_inactive_frames),
            input_size: parse_or(&lookup, "PITCH_INPUT_SIZE", defaults.input_size),
            crf: parse_or(&lookup, "PITCH_CRF", defaults.crf),
            preset: lookup("PITCH_PRESET").unwrap_or(defaults.preset),
            use_nvenc: parse_or(&lookup, "PITCH_USE_NVENC", defaults.use_nvenc),
        }
    }

    /// Pipeline settings for this worker.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut encoding = EncodingConfig::default()
            .with_crf(self.crf)
            .with_preset(self.preset.clone());
        if self.use_nvenc {
            encoding = encoding.with_nvenc();
        }

        PipelineConfig {
            output_dir: self.output_dir.clone(),
            tracker: TrackerConfig {
                confidence_threshold: self.confidence_threshold,
                max_match_distance: self.max_match_distance,
                max_inactive_frames: self.max_inactive_frames,
                ..TrackerConfig::default()
            },
            encoding,
            ..PipelineConfig::default()
        }
    }

    #[cfg(feature = "onnx")]
    pub fn yolo_config(&self) -> pitch_media::YoloConfig {
        pitch_media::YoloConfig {
            model_path: self.model_path.clone(),
            input_size: self.input_size,
            ..pitch_media::YoloConfig::default()
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = WorkerConfig::from_lookup(lookup(&[]));
        assert_eq!(config.model_path, PathBuf::from("models/yolov8n.onnx"));
        assert_eq!(config.max_inactive_frames, 30);
        assert_eq!(config.max_match_distance, 80.0);
        assert!(!config.use_nvenc);
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("PITCH_OUTPUT_DIR", "/data/out"),
            ("PITCH_CONF_THRESHOLD", "0.5"),
            ("PITCH_MAX_INACTIVE_FRAMES", "ten"),
            ("PITCH_CRF", " 18 "),
            ("PITCH_USE_NVENC", "true"),
        ]));

        assert_eq!(config.output_dir, PathBuf::from("/data/out"));
        assert_eq!(config.confidence_threshold, 0.5);
        assert_eq!(config.max_inactive_frames, 30);
        assert_eq!(config.crf, 18);
        assert!(config.use_nvenc);
    }

    #[test]
    fn test_pipeline_config() {
        let config = WorkerConfig {
            max_match_distance: 40.0,
            crf: 28,
            ..WorkerConfig::default()
        };
        let pipeline = config.pipeline_config();

        assert_eq!(pipeline.tracker.max_match_distance, 40.0);
        assert!(pipeline.tracker.accepts_class(32));
        assert_eq!(pipeline.encoding.crf, 28);
        assert_eq!(pipeline.output_dir, PathBuf::from("output"));
    }
}

//! Error types for the analysis pipeline.

use std::path::PathBuf;
use thiserror::Error;

use pitch_models::ViewKind;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Everything that can go wrong between opening a video and finishing its views.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("Cannot open video {path}: {message}")]
    MediaOpen { path: PathBuf, message: String },

    #[error("Detector model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Frame {index} could not be decoded: {message}")]
    FrameDecode { index: u64, message: String },

    #[error("Encoder for {view} view failed: {message}")]
    Encode { view: ViewKind, message: String },

    #[error("Object detection failed: {0}")]
    DetectionFailed(String),

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    pub fn media_open(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::MediaOpen {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn model_unavailable(message: impl Into<String>) -> Self {
        Self::ModelUnavailable(message.into())
    }

    pub fn frame_decode(index: u64, message: impl Into<String>) -> Self {
        Self::FrameDecode {
            index,
            message: message.into(),
        }
    }

    /// Failure of one view's sink; the other views keep going.
    pub fn encode(view: ViewKind, message: impl Into<String>) -> Self {
        Self::Encode {
            view,
            message: message.into(),
        }
    }

    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Short stable label, used as a metrics dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FfmpegNotFound | Self::FfprobeNotFound => "tool_missing",
            Self::MediaOpen { .. } | Self::FileNotFound(_) | Self::InvalidVideo(_) => "media_open",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::FrameDecode { .. } => "frame_decode",
            Self::Encode { .. } => "encode",
            Self::DetectionFailed(_) => "detection_failed",
            Self::FfmpegFailed { .. } | Self::FfprobeFailed { .. } => "ffmpeg",
            Self::Cancelled => "cancelled",
            Self::Io(_) => "io",
            Self::JsonParse(_) => "json",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the input could not be opened at all.
    pub fn is_media_open(&self) -> bool {
        matches!(
            self,
            Self::MediaOpen { .. }
                | Self::FfmpegNotFound
                | Self::FfprobeNotFound
                | Self::FileNotFound(_)
                | Self::InvalidVideo(_)
                | Self::FfprobeFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_kinds() {
        assert_eq!(MediaError::frame_decode(3, "bad packet").kind(), "frame_decode");
        assert_eq!(MediaError::encode(ViewKind::Line, "broken pipe").kind(), "encode");
        assert_eq!(MediaError::FileNotFound("/tmp/a.mp4".into()).kind(), "media_open");
        assert_eq!(MediaError::Cancelled.kind(), "cancelled");
    }

    #[test]
    fn test_media_open_message() {
        let err = MediaError::media_open("/tmp/a.mp4", "zero frames");
        assert!(err.is_media_open());
        assert_eq!(err.to_string(), "Cannot open video /tmp/a.mp4: zero frames");
    }
}

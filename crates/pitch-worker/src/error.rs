//! Worker error types.

use thiserror::Error;

use pitch_media::MediaError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Failed to serialize result: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Process exit code for this error.
    ///
    /// 2 usage, 3 unreadable input, 4 model unavailable, 130 cancelled, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidInput(_) | Self::ConfigError(_) => 2,
            Self::Media(MediaError::Cancelled) => 130,
            Self::Media(MediaError::ModelUnavailable(_)) => 4,
            Self::Media(e) if e.is_media_open() => 3,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(WorkerError::invalid_input("bad extension").exit_code(), 2);
        assert_eq!(WorkerError::from(MediaError::media_open("a.mp4", "corrupt")).exit_code(), 3);
        assert_eq!(WorkerError::from(MediaError::model_unavailable("missing")).exit_code(), 4);
        assert_eq!(WorkerError::from(MediaError::Cancelled).exit_code(), 130);
        assert_eq!(WorkerError::from(MediaError::detection_failed("boom")).exit_code(), 1);
    }
}

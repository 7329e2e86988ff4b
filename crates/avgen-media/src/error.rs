//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use crate::planner::PlanError;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

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

    #[error("No segments to stitch")]
    NoSegments,

    #[error("Output {path} is {size} bytes, expected at least {min}")]
    OutputTooSmall { path: PathBuf, size: u64, min: u64 },

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Invalid media file: {0}")]
    InvalidMedia(String),

    #[error("Planning failed: {0}")]
    Plan(#[from] PlanError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
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

    /// Create an FFprobe failure error.
    pub fn ffprobe_failed(message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::FfprobeFailed {
            message: message.into(),
            stderr,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether a later run may succeed without operator intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MediaError::FfmpegFailed { .. }
                | MediaError::FfprobeFailed { .. }
                | MediaError::Timeout(_)
                | MediaError::OutputTooSmall { .. }
                | MediaError::Io(_)
        )
    }

    /// Short diagnostic including the tail of the tool's stderr, if any.
    pub fn diagnostic(&self) -> String {
        match self {
            MediaError::FfmpegFailed {
                message,
                stderr: Some(stderr),
                ..
            }
            | MediaError::FfprobeFailed {
                message,
                stderr: Some(stderr),
            } => format!("{}: {}", message, tail(stderr, 200)),
            other => other.to_string(),
        }
    }
}

fn tail(s: &str, max_chars: usize) -> &str {
    let s = s.trim();
    let count = s.chars().count();
    if count <= max_chars {
        return s;
    }
    let skip = count - max_chars;
    let start = s.char_indices().nth(skip).map(|(i, _)| i).unwrap_or(0);
    &s[start..]
}

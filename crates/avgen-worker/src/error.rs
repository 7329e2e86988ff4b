//! Worker error types.

use std::path::PathBuf;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Input not found: {0}")]
    MissingInput(PathBuf),

    #[error("Remote job failed: {0}")]
    RemoteFailed(String),

    #[error("Remote job produced no video: {0}")]
    NoOutput(String),

    #[error("ComfyUI error: {0}")]
    Client(#[from] avgen_comfy::ClientError),

    #[error("Media error: {0}")]
    Media(#[from] avgen_media::MediaError),

    #[error("Planning error: {0}")]
    Plan(#[from] avgen_media::PlanError),

    #[error("State error: {0}")]
    State(#[from] avgen_state::StateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn remote_failed(msg: impl Into<String>) -> Self {
        Self::RemoteFailed(msg.into())
    }

    /// Check if error is retryable (a later run may succeed unchanged).
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Client(e) => e.is_retryable(),
            WorkerError::Media(e) => e.is_retryable(),
            WorkerError::RemoteFailed(_) | WorkerError::NoOutput(_) | WorkerError::Io(_) => true,
            _ => false,
        }
    }

    /// Short reason recorded in the state file.
    pub fn reason(&self) -> String {
        match self {
            WorkerError::Media(e) => e.diagnostic(),
            other => other.to_string(),
        }
    }
}

//! State store error types.

use std::path::PathBuf;

use avgen_models::RecordError;
use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Corrupt state file {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("Job '{job}': {source}")]
    Record {
        job: String,
        #[source]
        source: RecordError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StateError {
    pub fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn record(job: impl Into<String>, source: RecordError) -> Self {
        Self::Record {
            job: job.into(),
            source,
        }
    }
}

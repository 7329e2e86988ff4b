//! ComfyUI client error types.

use thiserror::Error;

/// Result type for ComfyUI client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while talking to the generation service.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection refused, reset, DNS failure, request timeout
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Request rejected ({0}): {1}")]
    Rejected(u16, String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid workflow: {0}")]
    Workflow(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn workflow(msg: impl Into<String>) -> Self {
        Self::Workflow(msg.into())
    }

    /// Map a non-success HTTP status to an error.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => Self::NotFound(message),
            429 => Self::RateLimited(message),
            500..=599 => Self::Server(status, message),
            _ => Self::Rejected(status, message),
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ClientError::Server(status, _) | ClientError::Rejected(status, _) => Some(*status),
            ClientError::NotFound(_) => Some(404),
            ClientError::RateLimited(_) => Some(429),
            ClientError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if error is retryable.
    ///
    /// Retryable errors say nothing about the remote job itself.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_) | ClientError::Server(..) | ClientError::RateLimited(_)
        )
    }

    /// Whether a status check that failed this way should be repeated.
    ///
    /// Only an explicit failure verdict ends a poll, so garbled or missing
    /// status replies count as transient on top of the retryable errors.
    pub fn is_transient_for_poll(&self) -> bool {
        self.is_retryable()
            || matches!(self, ClientError::InvalidResponse(_) | ClientError::NotFound(_))
    }
}

//! Structured job logging utilities.
//!
//! Per-job lifecycle events with the job name and operation attached to
//! every line, plus tracing subscriber setup for the binaries.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job: String,
    operation: String,
}

impl JobLogger {
    /// Create a logger for `job` performing `operation` (e.g. "generate", "stitch").
    pub fn new(job: &str, operation: &str) -> Self {
        Self {
            job: job.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job = %self.job,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job = %self.job,
            operation = %self.operation,
            "Job progress: {}", message
        );
    }

    /// Progress of one segment.
    pub fn log_segment(&self, index: u32, total: usize, message: &str) {
        info!(
            job = %self.job,
            operation = %self.operation,
            segment = index,
            segments_total = total,
            "Segment {}/{}: {}", index, total.saturating_sub(1), message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job = %self.job,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job = %self.job,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job = %self.job,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span carrying the job context, for instrumenting async work.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job = %self.job,
            operation = %self.operation
        )
    }
}

/// Initialize tracing: colored output by default, JSON with `LOG_FORMAT=json`.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let logger = JobLogger::new("v1_intro_avatar", "generate");
        assert_eq!(logger.job(), "v1_intro_avatar");
        assert_eq!(logger.operation(), "generate");
    }
}

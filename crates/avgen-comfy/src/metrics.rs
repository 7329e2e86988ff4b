//! ComfyUI client metrics.
//!
//! - Request counters by operation and status
//! - Latency histograms
//! - Retry counters
//! - Remote job outcomes

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total ComfyUI requests by operation and status.
    pub const REQUESTS_TOTAL: &str = "comfyui_requests_total";

    /// Total retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "comfyui_retries_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "comfyui_latency_seconds";

    /// Finished polls by outcome (completed, failed, timed_out).
    pub const JOBS_TOTAL: &str = "comfyui_jobs_total";

    /// Wall-clock time spent waiting on remote jobs.
    pub const JOB_WAIT_SECONDS: &str = "comfyui_job_wait_seconds";
}

/// Record metrics for a completed request.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

/// Record a retry attempt.
pub fn record_retry(operation: &str) {
    counter!(
        names::RETRIES_TOTAL,
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record how a poll loop ended.
pub fn record_job_outcome(outcome: &'static str, wait_secs: f64) {
    counter!(names::JOBS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::JOB_WAIT_SECONDS, "outcome" => outcome).record(wait_secs);
}

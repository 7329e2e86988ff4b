//! Pipeline metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Segments by outcome (generated, skipped, failed, timed_out).
    pub const SEGMENTS_TOTAL: &str = "avgen_segments_total";

    /// Wall-clock time to generate one segment, submit to verified file.
    pub const SEGMENT_SECONDS: &str = "avgen_segment_seconds";

    /// Stitch attempts by outcome.
    pub const STITCH_TOTAL: &str = "avgen_stitch_total";

    /// Jobs by final outcome of a run.
    pub const JOBS_TOTAL: &str = "avgen_jobs_total";
}

pub fn record_segment_generated(job: &str, secs: f64) {
    counter!(names::SEGMENTS_TOTAL, "job" => job.to_string(), "outcome" => "generated").increment(1);
    histogram!(names::SEGMENT_SECONDS, "job" => job.to_string()).record(secs);
}

pub fn record_segment_outcome(job: &str, outcome: &'static str) {
    counter!(names::SEGMENTS_TOTAL, "job" => job.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_stitch(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(names::STITCH_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_job_outcome(outcome: &'static str) {
    counter!(names::JOBS_TOTAL, "outcome" => outcome).increment(1);
}

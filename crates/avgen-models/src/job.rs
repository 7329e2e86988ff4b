//! Job definitions and per-job progress records.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A talking-head generation job as configured by the operator.
///
/// The `name` is the stable key under which progress is tracked across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Unique, stable job name (also the output file stem)
    pub name: String,
    /// Face photo file name, relative to the photos directory
    pub photo: String,
    /// Narration audio file name, relative to the audio directory
    pub audio: String,
    /// Free-form description shown in logs
    #[serde(default)]
    pub description: String,
}

/// Job processing status as persisted in the state file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Known but never started
    #[default]
    Pending,
    /// Segments are being generated
    InProgress,
    /// Final output stitched and verified
    Completed,
    /// At least one segment failed in the last run
    Failed,
    /// Every segment exists but the final compose failed
    StitchFailed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::StitchFailed => "stitch_failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors raised when a mutation would break a [`JobRecord`] invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("segment index {index} out of range (segments_total = {total})")]
    SegmentOutOfRange { index: u32, total: u32 },

    #[error("cannot mark stitched: {completed}/{total} segments completed")]
    SegmentsIncomplete { completed: u32, total: u32 },

    #[error("completed job is not stitched")]
    CompletedNotStitched,
}

/// Persisted progress of a single job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JobRecord {
    #[serde(default)]
    pub status: JobStatus,

    /// Generation mode used (informational)
    #[serde(default)]
    pub job_type: Option<String>,

    /// Number of planned segments, fixed once the plan is computed
    #[serde(default)]
    pub segments_total: u32,

    /// Segment indices whose output was verified on disk
    #[serde(default)]
    pub segments_completed: BTreeSet<u32>,

    /// True only after the merged output was produced and verified
    #[serde(default)]
    pub stitched: bool,

    #[serde(default)]
    pub output_path: Option<PathBuf>,

    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,

    /// Most recent failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl JobRecord {
    pub fn new() -> Self {
        Self::default()
    }

    fn touch(&mut self) {
        self.last_updated = Some(Utc::now());
    }

    /// Start (or restart) the job with a freshly computed plan size.
    ///
    /// Completed indices outside the new plan are dropped, so a changed
    /// configuration never leaves stale indices behind.
    pub fn start(&mut self, job_type: impl Into<String>, segments_total: u32) {
        self.job_type = Some(job_type.into());
        if self.segments_total != segments_total {
            self.segments_completed.retain(|&i| i < segments_total);
            self.segments_total = segments_total;
        }
        if self.stitched && self.completed_count() != segments_total {
            self.stitched = false;
        }
        if self.status != JobStatus::Completed {
            self.status = JobStatus::InProgress;
        }
        self.touch();
    }

    /// Record a verified segment. Returns `true` if the index was new.
    pub fn mark_segment_complete(&mut self, index: u32) -> Result<bool, RecordError> {
        if index >= self.segments_total {
            return Err(RecordError::SegmentOutOfRange {
                index,
                total: self.segments_total,
            });
        }
        let inserted = self.segments_completed.insert(index);
        self.touch();
        Ok(inserted)
    }

    /// Record the verified final output. Marks the job completed.
    pub fn mark_stitched(&mut self, output_path: impl Into<PathBuf>) -> Result<(), RecordError> {
        if !self.all_segments_complete() {
            return Err(RecordError::SegmentsIncomplete {
                completed: self.completed_count(),
                total: self.segments_total,
            });
        }
        self.stitched = true;
        self.output_path = Some(output_path.into());
        self.status = JobStatus::Completed;
        self.last_error = None;
        self.touch();
        Ok(())
    }

    /// Record a final output that was found on disk from an earlier run.
    ///
    /// The final artifact subsumes its segments, so every planned index is
    /// considered complete.
    pub fn mark_completed(&mut self, output_path: impl Into<PathBuf>) {
        self.segments_completed = (0..self.segments_total).collect();
        self.stitched = true;
        self.output_path = Some(output_path.into());
        self.status = JobStatus::Completed;
        self.last_error = None;
        self.touch();
    }

    /// Replace the completed set with the segments verified on disk.
    ///
    /// A segment counts as done only while its output file exists, so
    /// indices whose file disappeared are dropped and a record claiming
    /// completion without its final output goes back to in progress.
    pub fn sync_segments(&mut self, job_type: impl Into<String>, segments_total: u32, verified: impl IntoIterator<Item = u32>) {
        self.job_type = Some(job_type.into());
        self.segments_total = segments_total;
        self.segments_completed = verified.into_iter().filter(|&i| i < segments_total).collect();
        self.stitched = false;
        if self.status == JobStatus::Completed || self.status == JobStatus::Pending {
            self.status = JobStatus::InProgress;
        }
        self.touch();
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.last_error = Some(reason.into());
        self.touch();
    }

    pub fn stitch_fail(&mut self, reason: impl Into<String>) {
        self.status = JobStatus::StitchFailed;
        self.stitched = false;
        self.last_error = Some(reason.into());
        self.touch();
    }

    pub fn completed_count(&self) -> u32 {
        self.segments_completed.len() as u32
    }

    pub fn remaining_segments(&self) -> u32 {
        self.segments_total.saturating_sub(self.completed_count())
    }

    pub fn all_segments_complete(&self) -> bool {
        self.segments_total > 0 && self.remaining_segments() == 0
    }

    /// Verify the record invariants.
    pub fn check_invariants(&self) -> Result<(), RecordError> {
        if let Some(&index) = self.segments_completed.iter().next_back() {
            if index >= self.segments_total {
                return Err(RecordError::SegmentOutOfRange {
                    index,
                    total: self.segments_total,
                });
            }
        }
        if self.stitched && self.completed_count() != self.segments_total {
            return Err(RecordError::SegmentsIncomplete {
                completed: self.completed_count(),
                total: self.segments_total,
            });
        }
        if self.status == JobStatus::Completed && !self.stitched {
            return Err(RecordError::CompletedNotStitched);
        }
        Ok(())
    }

    /// What the next run will do with this job.
    pub fn next_action(&self) -> ResumeAction {
        match self.status {
            JobStatus::Completed => ResumeAction::Skip,
            JobStatus::Pending => ResumeAction::New,
            _ if self.segments_total == 0 => ResumeAction::Retry,
            _ if self.remaining_segments() > 0 => ResumeAction::Resume {
                remaining: self.remaining_segments(),
            },
            _ if !self.stitched => ResumeAction::Stitch,
            _ => ResumeAction::Retry,
        }
    }
}

/// Planned action for a job on the next run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeAction {
    /// Already completed
    Skip,
    /// Segments remain to be generated
    Resume { remaining: u32 },
    /// All segments exist, only the final compose is missing
    Stitch,
    /// Failed before a plan was recorded
    Retry,
    /// Not started
    New,
    /// Tracked in state but absent from the job list
    NotConfigured,
}

impl ResumeAction {
    pub fn label(&self) -> &'static str {
        match self {
            ResumeAction::Skip => "SKIP",
            ResumeAction::Resume { .. } => "RESUME",
            ResumeAction::Stitch => "STITCH",
            ResumeAction::Retry => "RETRY",
            ResumeAction::New => "NEW",
            ResumeAction::NotConfigured => "SKIP",
        }
    }

    /// Render the report line printed before a run starts.
    pub fn describe(&self, job_name: &str) -> String {
        match self {
            ResumeAction::Skip => format!("[SKIP] {} (already completed)", job_name),
            ResumeAction::Resume { remaining } => {
                format!("[RESUME] {} ({} segments remaining)", job_name, remaining)
            }
            ResumeAction::Stitch => {
                format!("[STITCH] {} (all segments done, needs stitching)", job_name)
            }
            ResumeAction::Retry => format!("[RETRY] {}", job_name),
            ResumeAction::New => format!("[NEW] {} (not started)", job_name),
            ResumeAction::NotConfigured => format!("[SKIP] {} (not configured)", job_name),
        }
    }
}

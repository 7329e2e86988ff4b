//! Human-readable run reports.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use avgen_models::{GenerationState, JobSpec, ResumeAction};

/// What the coming run will do with one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeEntry {
    pub name: String,
    pub action: ResumeAction,
}

impl ResumeEntry {
    pub fn line(&self) -> String {
        self.action.describe(&self.name)
    }
}

/// Final result of one job in a run.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Final output already existed
    AlreadyComplete,
    /// Stitched and verified in this run
    Completed { output: PathBuf },
    /// Every segment exists but the compose failed
    StitchFailed(String),
    /// Some segments are still missing
    Incomplete { remaining: u32, failed: u32, timed_out: u32 },
    /// The job could not start (probe, planning or photo upload)
    Failed(String),
    /// Photo or audio not found; nothing recorded
    MissingInput(PathBuf),
}

impl JobOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::AlreadyComplete => "skipped",
            JobOutcome::Completed { .. } => "completed",
            JobOutcome::StitchFailed(_) => "stitch_failed",
            JobOutcome::Incomplete { .. } => "incomplete",
            JobOutcome::Failed(_) => "failed",
            JobOutcome::MissingInput(_) => "missing_input",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, JobOutcome::AlreadyComplete | JobOutcome::Completed { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobSummary {
    pub name: String,
    pub outcome: JobOutcome,
    /// Segments generated in this run
    pub generated: u32,
    /// Segments found on disk
    pub skipped: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Report printed before any work
    pub resume: Vec<ResumeEntry>,
    pub jobs: Vec<JobSummary>,
}

impl RunSummary {
    pub fn job(&self, name: &str) -> Option<&JobSummary> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn all_done(&self) -> bool {
        self.jobs.iter().all(|j| j.outcome.is_done())
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\n--- Run Summary ---\n");
        for job in &self.jobs {
            let detail = match &job.outcome {
                JobOutcome::AlreadyComplete => "already complete".to_string(),
                JobOutcome::Completed { output } => output.display().to_string(),
                JobOutcome::StitchFailed(reason) | JobOutcome::Failed(reason) => reason.clone(),
                JobOutcome::Incomplete {
                    remaining,
                    failed,
                    timed_out,
                } => format!(
                    "{} segments remaining ({} failed, {} timed out)",
                    remaining, failed, timed_out
                ),
                JobOutcome::MissingInput(path) => format!("not found: {}", path.display()),
            };
            let _ = writeln!(
                out,
                "  {:<25} {:<14} +{} generated, {} reused  {}",
                job.name,
                job.outcome.label(),
                job.generated,
                job.skipped,
                detail
            );
        }
        out
    }
}

/// Table of tracked jobs and what the next run will do.
pub fn resume_status(state: &GenerationState, jobs: &[JobSpec], state_file: &Path) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n--- Generation Progress (Resume State) ---\n");

    let Some(last_run) = state.last_run else {
        let _ = writeln!(out, "  No previous runs recorded.");
        let _ = writeln!(out, "  State file: {}", state_file.display());
        return out;
    };
    let _ = writeln!(out, "  Last run: {}", last_run.to_rfc3339());
    let _ = writeln!(out, "  State file: {}", state_file.display());

    if state.jobs.is_empty() {
        let _ = writeln!(out, "  No jobs tracked yet.");
    } else {
        let _ = writeln!(out, "\n  {:<25} {:<15} {:<15} {:<10}", "Job", "Status", "Segments", "Stitched");
        let _ = writeln!(out, "  {} {} {} {}", "-".repeat(25), "-".repeat(15), "-".repeat(15), "-".repeat(10));
        for (name, record) in &state.jobs {
            let segments = if record.segments_total > 0 {
                format!("{}/{}", record.completed_count(), record.segments_total)
            } else {
                "-".to_string()
            };
            let _ = writeln!(
                out,
                "  {:<25} {:<15} {:<15} {:<10}",
                name,
                record.status.as_str(),
                segments,
                if record.stitched { "Yes" } else { "No" }
            );
        }
    }

    let _ = writeln!(out, "\n  Next run will:");
    for entry in planned_actions(state, jobs) {
        let _ = writeln!(out, "    {}", entry.line());
    }
    out
}

/// Tracked jobs first (in name order), then configured jobs not yet tracked.
pub fn planned_actions(state: &GenerationState, jobs: &[JobSpec]) -> Vec<ResumeEntry> {
    let mut entries: Vec<ResumeEntry> = state
        .jobs
        .iter()
        .map(|(name, record)| ResumeEntry {
            name: name.clone(),
            action: if jobs.iter().any(|job| &job.name == name) {
                record.next_action()
            } else {
                ResumeAction::NotConfigured
            },
        })
        .collect();
    entries.extend(
        jobs.iter()
            .filter(|job| state.job(&job.name).is_none())
            .map(|job| ResumeEntry {
                name: job.name.clone(),
                action: ResumeAction::New,
            }),
    );
    entries
}

pub fn format_mb(bytes: u64) -> String {
    format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use avgen_models::JobRecord;

    fn spec(name: &str) -> JobSpec {
        JobSpec {
            name: name.to_string(),
            photo: "avatar_photo.jpg".to_string(),
            audio: format!("{}.wav", name),
            description: String::new(),
        }
    }

    #[test]
    fn test_resume_status_without_runs() {
        let report = resume_status(&GenerationState::empty(), &[], Path::new("state.json"));
        assert!(report.contains("No previous runs recorded."));
    }

    #[test]
    fn test_resume_status_lines() {
        let mut state = GenerationState::empty();
        state.mark_run_started();
        let mut record = JobRecord::new();
        record.start("fantasytalking", 3);
        record.mark_segment_complete(0).unwrap();
        record.mark_segment_complete(1).unwrap();
        state.jobs.insert("v1_intro_avatar".to_string(), record);
        state.job_mut("v0_old_avatar").start("fantasytalking", 2);

        let jobs = [spec("v1_intro_avatar"), spec("v3_intro_avatar")];
        let report = resume_status(&state, &jobs, Path::new("state.json"));

        assert!(report.contains("v1_intro_avatar           in_progress     2/3"));
        assert!(report.contains("[RESUME] v1_intro_avatar (1 segments remaining)"));
        assert!(report.contains("[NEW] v3_intro_avatar (not started)"));
        assert!(report.contains("[SKIP] v0_old_avatar (not configured)"));
    }

    #[test]
    fn test_format_mb() {
        assert_eq!(format_mb(3 * 1024 * 1024 / 2), "1.5MB");
    }
}

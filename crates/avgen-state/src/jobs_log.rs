//! Log of ad-hoc jobs queued from the command line.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::store::write_json_atomic;

/// Entries kept in the log.
pub const MAX_LOGGED_JOBS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoggedJobStatus {
    #[default]
    Queued,
    Completed,
    Failed,
}

impl LoggedJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoggedJobStatus::Queued => "queued",
            LoggedJobStatus::Completed => "completed",
            LoggedJobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedJob {
    pub prompt_id: String,
    pub workflow: String,
    #[serde(default)]
    pub image: Option<String>,
    pub queued_at: DateTime<Utc>,
    #[serde(default)]
    pub status: LoggedJobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
}

impl LoggedJob {
    pub fn queued(prompt_id: impl Into<String>, workflow: impl Into<String>, image: Option<String>) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            workflow: workflow.into(),
            image,
            queued_at: Utc::now(),
            status: LoggedJobStatus::Queued,
            completed_at: None,
            elapsed_seconds: None,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JobsDocument {
    #[serde(default)]
    jobs: Vec<LoggedJob>,
}

/// JSON document of recently queued jobs, oldest first.
#[derive(Debug, Clone)]
pub struct JobsLog {
    path: PathBuf,
}

impl JobsLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All logged jobs. A missing or unreadable log is empty.
    pub async fn load(&self) -> Vec<LoggedJob> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), "Could not read jobs log: {}", e);
                return Vec::new();
            }
        };
        match serde_json::from_slice::<JobsDocument>(&bytes) {
            Ok(doc) => doc.jobs,
            Err(e) => {
                warn!("{}", StateError::corrupt(&self.path, e.to_string()));
                Vec::new()
            }
        }
    }

    async fn store(&self, jobs: Vec<LoggedJob>) -> StateResult<()> {
        write_json_atomic(&self.path, &JobsDocument { jobs }).await
    }

    /// Append a job, keeping only the newest [`MAX_LOGGED_JOBS`].
    pub async fn append(&self, job: LoggedJob) -> StateResult<()> {
        let mut jobs = self.load().await;
        jobs.push(job);
        if jobs.len() > MAX_LOGGED_JOBS {
            jobs.drain(..jobs.len() - MAX_LOGGED_JOBS);
        }
        self.store(jobs).await
    }

    /// Mark a job finished. Returns `false` if the id is not in the log.
    pub async fn mark_finished(
        &self,
        prompt_id: &str,
        status: LoggedJobStatus,
        elapsed_seconds: f64,
    ) -> StateResult<bool> {
        let mut jobs = self.load().await;
        let Some(job) = jobs.iter_mut().find(|j| j.prompt_id == prompt_id) else {
            debug!(prompt_id, "Job not in log");
            return Ok(false);
        };
        job.status = status;
        job.completed_at = Some(Utc::now());
        job.elapsed_seconds = Some(elapsed_seconds);
        self.store(jobs).await?;
        Ok(true)
    }

    pub async fn mark_completed(&self, prompt_id: &str, elapsed_seconds: f64) -> StateResult<bool> {
        self.mark_finished(prompt_id, LoggedJobStatus::Completed, elapsed_seconds)
            .await
    }

    /// Up to `limit` jobs, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<LoggedJob> {
        let mut jobs = self.load().await;
        jobs.reverse();
        jobs.truncate(limit);
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_caps_log() {
        let dir = TempDir::new().unwrap();
        let log = JobsLog::new(dir.path().join("comfyui_jobs.json"));

        for i in 0..(MAX_LOGGED_JOBS + 5) {
            log.append(LoggedJob::queued(format!("p{}", i), "flux_candle", None))
                .await
                .unwrap();
        }

        let jobs = log.load().await;
        assert_eq!(jobs.len(), MAX_LOGGED_JOBS);
        assert_eq!(jobs[0].prompt_id, "p5");
        assert_eq!(jobs.last().unwrap().prompt_id, format!("p{}", MAX_LOGGED_JOBS + 4));
    }

    #[tokio::test]
    async fn test_mark_completed_and_recent() {
        let dir = TempDir::new().unwrap();
        let log = JobsLog::new(dir.path().join("comfyui_jobs.json"));
        log.append(LoggedJob::queued("first", "wan_i2v", Some("candle.png".into())))
            .await
            .unwrap();
        log.append(LoggedJob::queued("second", "wan_i2v", None)).await.unwrap();

        assert!(log.mark_completed("first", 1834.5).await.unwrap());
        assert!(!log.mark_completed("missing", 1.0).await.unwrap());

        let recent = log.recent(10).await;
        assert_eq!(recent[0].prompt_id, "second");
        assert_eq!(recent[1].status, LoggedJobStatus::Completed);
        assert_eq!(recent[1].elapsed_seconds, Some(1834.5));
        assert!(recent[1].completed_at.is_some());
        assert_eq!(log.recent(1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_log_reads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("comfyui_jobs.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        assert!(JobsLog::new(&path).load().await.is_empty());
    }
}

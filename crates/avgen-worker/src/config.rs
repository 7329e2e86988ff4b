//! Pipeline configuration.

use std::path::{Path, PathBuf};

use avgen_comfy::ComfyConfig;
use avgen_media::planner::DEFAULT_OVERLAP_SECS;
use avgen_media::SegmentPlanner;
use avgen_models::JobSpec;

use crate::error::{WorkerError, WorkerResult};

/// Sampler steps in production runs.
pub const PRODUCTION_STEPS: u32 = 30;
/// Sampler steps in test mode.
pub const TEST_STEPS: u32 = 20;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Face photos referenced by job specs
    pub photos_dir: PathBuf,
    /// Narration audio referenced by job specs
    pub audio_dir: PathBuf,
    /// Final outputs and per-job segment directories
    pub output_dir: PathBuf,
    /// Downloads of ad-hoc jobs (`wait`)
    pub downloads_dir: PathBuf,
    /// Resume state document
    pub state_file: PathBuf,
    /// JSON list of job specs
    pub jobs_file: PathBuf,
    /// Log of ad-hoc queued jobs
    pub jobs_log_file: PathBuf,
    /// Workflow templates for ad-hoc queueing
    pub workflows_dir: PathBuf,
    /// Talking-head workflow template
    pub workflow_file: PathBuf,
    /// Recorded as the job type in state
    pub job_type: String,
    /// Shorter windows and fewer steps for quick iterations
    pub test_mode: bool,
    /// Segment clips at or below this size are not considered produced
    pub min_segment_bytes: u64,
    /// Final outputs at or below this size are not considered produced
    pub min_output_bytes: u64,
    /// Window overlap, also used as the stitch crossfade
    pub overlap: f64,
    pub comfy: ComfyConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            photos_dir: PathBuf::from("assets/photos"),
            audio_dir: PathBuf::from("assets/audio"),
            output_dir: PathBuf::from("output/fantasytalking"),
            downloads_dir: PathBuf::from("output/downloads"),
            state_file: PathBuf::from("state/generation_progress.json"),
            jobs_file: PathBuf::from("jobs.json"),
            jobs_log_file: PathBuf::from("comfyui_jobs.json"),
            workflows_dir: PathBuf::from("workflows"),
            workflow_file: PathBuf::from("workflows/fantasytalking.json"),
            job_type: "fantasytalking".to_string(),
            test_mode: false,
            min_segment_bytes: 50_000,
            min_output_bytes: 100_000,
            overlap: DEFAULT_OVERLAP_SECS,
            comfy: ComfyConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let path = |name: &str, default: PathBuf| -> PathBuf {
            std::env::var(name)
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default)
        };

        Self {
            photos_dir: path("AVGEN_PHOTOS_DIR", defaults.photos_dir),
            audio_dir: path("AVGEN_AUDIO_DIR", defaults.audio_dir),
            output_dir: path("AVGEN_OUTPUT_DIR", defaults.output_dir),
            downloads_dir: path("AVGEN_DOWNLOADS_DIR", defaults.downloads_dir),
            state_file: path("AVGEN_STATE_FILE", defaults.state_file),
            jobs_file: path("AVGEN_JOBS_FILE", defaults.jobs_file),
            jobs_log_file: path("AVGEN_JOBS_LOG", defaults.jobs_log_file),
            workflows_dir: path("AVGEN_WORKFLOWS_DIR", defaults.workflows_dir),
            workflow_file: path("AVGEN_WORKFLOW", defaults.workflow_file),
            job_type: std::env::var("AVGEN_JOB_TYPE").unwrap_or(defaults.job_type),
            test_mode: std::env::var("AVGEN_TEST_MODE")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            min_segment_bytes: std::env::var("AVGEN_MIN_SEGMENT_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_segment_bytes),
            min_output_bytes: std::env::var("AVGEN_MIN_OUTPUT_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_output_bytes),
            overlap: std::env::var("AVGEN_OVERLAP_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.overlap),
            comfy: ComfyConfig::from_env(),
        }
    }

    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = self.test_mode || test_mode;
        self
    }

    pub fn planner(&self) -> SegmentPlanner {
        let base = if self.test_mode {
            SegmentPlanner::test_mode()
        } else {
            SegmentPlanner::default()
        };
        SegmentPlanner {
            overlap: self.overlap,
            ..base
        }
    }

    pub fn steps(&self) -> u32 {
        if self.test_mode {
            TEST_STEPS
        } else {
            PRODUCTION_STEPS
        }
    }

    pub fn photo_path(&self, job: &JobSpec) -> PathBuf {
        self.photos_dir.join(&job.photo)
    }

    pub fn audio_path(&self, job: &JobSpec) -> PathBuf {
        self.audio_dir.join(&job.audio)
    }

    /// `<output_dir>/<job>.mp4`
    pub fn final_output_path(&self, job_name: &str) -> PathBuf {
        self.output_dir.join(format!("{}.mp4", job_name))
    }

    /// `<output_dir>/<job>_segments`
    pub fn segment_dir(&self, job_name: &str) -> PathBuf {
        self.output_dir.join(format!("{}_segments", job_name))
    }

    /// `<output_dir>/<job>_segments/<job>_segNN.mp4`, the name resume
    /// detection looks for.
    pub fn segment_clip_path(&self, job_name: &str, index: u32) -> PathBuf {
        self.segment_dir(job_name)
            .join(format!("{}_seg{:02}.mp4", job_name, index))
    }

    /// Workflow template path for an ad-hoc workflow name.
    pub fn named_workflow(&self, name: &str) -> PathBuf {
        let file = if name.ends_with(".json") {
            name.to_string()
        } else {
            format!("{}.json", name)
        };
        self.workflows_dir.join(file)
    }
}

/// Load job specs from a JSON array file. Names must be unique.
pub async fn load_jobs(path: impl AsRef<Path>) -> WorkerResult<Vec<JobSpec>> {
    let path = path.as_ref();
    let raw = tokio::fs::read(path).await.map_err(|e| {
        WorkerError::config_error(format!("cannot read jobs file {}: {}", path.display(), e))
    })?;
    let jobs: Vec<JobSpec> = serde_json::from_slice(&raw).map_err(|e| {
        WorkerError::config_error(format!("invalid jobs file {}: {}", path.display(), e))
    })?;

    let mut seen = std::collections::HashSet::new();
    for job in &jobs {
        if job.name.trim().is_empty() {
            return Err(WorkerError::config_error("job with empty name"));
        }
        if !seen.insert(job.name.as_str()) {
            return Err(WorkerError::config_error(format!(
                "duplicate job name: {}",
                job.name
            )));
        }
    }
    Ok(jobs)
}

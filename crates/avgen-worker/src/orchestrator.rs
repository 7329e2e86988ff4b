//! Pipeline orchestrator.
//!
//! A run has two phases. Reconcile computes every job's plan, checks which
//! segment clips already exist on disk, merges that into the state and
//! reports what will happen. Then jobs are processed one at a time, one
//! segment at a time, checkpointing after every verified segment.
//!
//! A segment is done iff its expected clip exists and exceeds
//! `min_segment_bytes`; the state file is a cache of that fact.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use avgen_comfy::{random_seed, talking_head_prompt, TalkingHeadParams, WorkflowTemplate};
use avgen_media::fs_utils::{file_size, is_produced, move_file, remove_if_exists, verify_output};
use avgen_media::audio_segment_path;
use avgen_models::{JobSpec, PollOutcome, ResumeAction, SegmentPlan, SegmentWindow};
use avgen_state::StateStore;
use tracing::{debug, info, warn, Instrument};

use crate::backend::GenerationBackend;
use crate::config::PipelineConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::media::MediaToolkit;
use crate::metrics::{record_job_outcome, record_segment_generated, record_segment_outcome, record_stitch};
use crate::report::{format_mb, JobOutcome, JobSummary, ResumeEntry, RunSummary};

/// Per-job result of the reconcile phase.
#[derive(Debug, Clone)]
enum Prepared {
    /// Final output verified on disk
    Done,
    Planned { plan: SegmentPlan, audio: PathBuf, photo: PathBuf },
    Missing(PathBuf),
    Unplannable(String),
}

/// Result of generating one segment.
enum Generation {
    Produced { bytes: u64 },
    TimedOut(Duration),
}

pub struct Orchestrator<S, B, M> {
    config: PipelineConfig,
    store: S,
    backend: B,
    media: M,
    template: WorkflowTemplate,
}

impl<S, B, M> Orchestrator<S, B, M>
where
    S: StateStore,
    B: GenerationBackend,
    M: MediaToolkit,
{
    pub fn new(config: PipelineConfig, store: S, backend: B, media: M, template: WorkflowTemplate) -> Self {
        Self {
            config,
            store,
            backend,
            media,
            template,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn media(&self) -> &M {
        &self.media
    }

    /// Run every job in order.
    pub async fn run(&self, jobs: &[JobSpec]) -> WorkerResult<RunSummary> {
        self.store.record_run_started().await?;

        let mut prepared = Vec::with_capacity(jobs.len());
        let mut resume = Vec::with_capacity(jobs.len());
        for job in jobs {
            let (entry, prep) = self.reconcile_job(job).await?;
            resume.push(entry);
            prepared.push(prep);
        }
        resume.extend(self.unconfigured(jobs).await);

        println!("\n  Next run will:");
        for entry in &resume {
            println!("    {}", entry.line());
            info!(job = %entry.name, action = entry.action.label(), "{}", entry.line());
        }

        let mut summary = RunSummary {
            resume,
            jobs: Vec::with_capacity(jobs.len()),
        };
        for (job, prep) in jobs.iter().zip(prepared) {
            let logger = JobLogger::new(&job.name, "generate");
            let span = logger.create_span();
            let job_summary = self.process_job(job, prep, &logger).instrument(span).await?;
            record_job_outcome(job_summary.outcome.label());
            summary.jobs.push(job_summary);
        }

        Ok(summary)
    }

    /// Reconcile the given jobs without running them.
    pub async fn reconcile(&self, jobs: &[JobSpec]) -> WorkerResult<Vec<ResumeEntry>> {
        let mut entries = Vec::with_capacity(jobs.len());
        for job in jobs {
            entries.push(self.reconcile_job(job).await?.0);
        }
        entries.extend(self.unconfigured(jobs).await);
        Ok(entries)
    }

    /// Tracked jobs missing from `jobs`; they are reported but never run.
    async fn unconfigured(&self, jobs: &[JobSpec]) -> Vec<ResumeEntry> {
        self.store
            .load()
            .await
            .jobs
            .into_keys()
            .filter(|name| !jobs.iter().any(|job| &job.name == name))
            .map(|name| ResumeEntry {
                name,
                action: ResumeAction::NotConfigured,
            })
            .collect()
    }

    async fn plan_for(&self, audio: &Path) -> WorkerResult<SegmentPlan> {
        let duration = self.media.probe_duration(audio).await?;
        let plan = self.config.planner().plan(duration)?;
        debug!(
            duration = duration,
            segments = plan.len(),
            "Planned {}",
            audio.display()
        );
        Ok(plan)
    }

    async fn reconcile_job(&self, job: &JobSpec) -> WorkerResult<(ResumeEntry, Prepared)> {
        let name = job.name.as_str();
        let job_type = self.config.job_type.as_str();
        let photo = self.config.photo_path(job);
        let audio = self.config.audio_path(job);
        let final_path = self.config.final_output_path(name);

        let prepared = if is_produced(&final_path, self.config.min_output_bytes).await {
            let planned_total = match self.plan_for(&audio).await {
                Ok(plan) => Some(plan.len() as u32),
                Err(_) => None,
            };
            self.store
                .update(|state| {
                    let record = state.job_mut(name);
                    let total = planned_total.unwrap_or(record.segments_total.max(1));
                    record.sync_segments(job_type, total, std::iter::empty());
                    record.mark_completed(&final_path);
                    Ok(())
                })
                .await?;
            Prepared::Done
        } else if !tokio::fs::try_exists(&photo).await.unwrap_or(false) {
            Prepared::Missing(photo)
        } else if !tokio::fs::try_exists(&audio).await.unwrap_or(false) {
            Prepared::Missing(audio)
        } else {
            match self.plan_for(&audio).await {
                Ok(plan) => {
                    let mut verified = Vec::new();
                    for window in &plan.windows {
                        let clip = self.config.segment_clip_path(name, window.index);
                        if is_produced(&clip, self.config.min_segment_bytes).await {
                            verified.push(window.index);
                        }
                    }
                    let total = plan.len() as u32;
                    self.store
                        .update(|state| {
                            let tracked = state.job(name).is_some_and(|r| r.next_action() != ResumeAction::New);
                            if tracked || !verified.is_empty() {
                                state.job_mut(name).sync_segments(job_type, total, verified);
                            }
                            Ok(())
                        })
                        .await?;
                    Prepared::Planned { plan, audio, photo }
                }
                Err(e) => Prepared::Unplannable(e.reason()),
            }
        };

        let action = self
            .store
            .load()
            .await
            .job(name)
            .map(|record| record.next_action())
            .unwrap_or(ResumeAction::New);

        Ok((
            ResumeEntry {
                name: name.to_string(),
                action,
            },
            prepared,
        ))
    }

    async fn process_job(&self, job: &JobSpec, prepared: Prepared, logger: &JobLogger) -> WorkerResult<JobSummary> {
        let name = job.name.as_str();
        let summary = |outcome, generated, skipped| JobSummary {
            name: name.to_string(),
            outcome,
            generated,
            skipped,
        };

        let (plan, audio, photo) = match prepared {
            Prepared::Done => {
                let final_path = self.config.final_output_path(name);
                let size = file_size(&final_path).await.unwrap_or(0);
                logger.log_progress(&format!(
                    "already completed: {} ({})",
                    final_path.display(),
                    format_mb(size)
                ));
                return Ok(summary(JobOutcome::AlreadyComplete, 0, 0));
            }
            Prepared::Missing(path) => {
                logger.log_warning(&format!("input not found: {}", path.display()));
                return Ok(summary(JobOutcome::MissingInput(path), 0, 0));
            }
            Prepared::Unplannable(reason) => {
                logger.log_error(&format!("cannot plan: {}", reason));
                self.store.record_failed(name, &reason).await?;
                return Ok(summary(JobOutcome::Failed(reason), 0, 0));
            }
            Prepared::Planned { plan, audio, photo } => (plan, audio, photo),
        };

        logger.log_start(&format!(
            "{} ({} segment(s), {:.2}s max window)",
            if job.description.is_empty() { name } else { job.description.as_str() },
            plan.len(),
            self.config.planner().max_window_secs()
        ));
        self.store
            .record_job_started(name, &self.config.job_type, plan.len() as u32)
            .await?;

        let mut photo_ref: Option<String> = None;
        let (mut generated, mut skipped, mut failed, mut timed_out) = (0u32, 0u32, 0u32, 0u32);

        for window in &plan.windows {
            let clip = self.config.segment_clip_path(name, window.index);

            if let Some(size) = file_size(&clip).await.filter(|&s| s > self.config.min_segment_bytes) {
                logger.log_segment(window.index, plan.len(), &format!("exists ({})", format_mb(size)));
                self.store.record_segment_complete(name, window.index).await?;
                record_segment_outcome(name, "skipped");
                skipped += 1;
                continue;
            }

            // The photo is uploaded once per job, only when something needs generating.
            if photo_ref.is_none() {
                match self.backend.upload(&photo).await {
                    Ok(image) => photo_ref = Some(image),
                    Err(e) => {
                        let reason = format!("photo upload failed: {}", e);
                        logger.log_error(&reason);
                        self.store.record_failed(name, &reason).await?;
                        return Ok(summary(JobOutcome::Failed(reason), generated, skipped));
                    }
                }
            }
            let image = photo_ref.clone().unwrap_or_default();

            logger.log_segment(
                window.index,
                plan.len(),
                &format!("{:.2}s, {} frames", window.duration, window.frames),
            );
            let started = Instant::now();
            match self
                .generate_segment(name, &plan, window, &image, &audio, &clip)
                .await
            {
                Ok(Generation::Produced { bytes }) => {
                    self.store.record_segment_complete(name, window.index).await?;
                    record_segment_generated(name, started.elapsed().as_secs_f64());
                    logger.log_segment(
                        window.index,
                        plan.len(),
                        &format!("generated -> {} ({})", clip.display(), format_mb(bytes)),
                    );
                    generated += 1;
                }
                Ok(Generation::TimedOut(elapsed)) => {
                    logger.log_warning(&format!(
                        "segment {} not available after {}s, leaving it for the next run",
                        window.index,
                        elapsed.as_secs()
                    ));
                    record_segment_outcome(name, "timed_out");
                    timed_out += 1;
                }
                Err(e) => {
                    let reason = format!("segment {}: {}", window.index, e.reason());
                    logger.log_error(&reason);
                    self.store.record_failed(name, &reason).await?;
                    record_segment_outcome(name, "failed");
                    failed += 1;
                }
            }
        }

        let state = self.store.load().await;
        let record = state.job(name).cloned().unwrap_or_default();
        if !record.all_segments_complete() {
            let remaining = record.remaining_segments();
            logger.log_warning(&format!("{} segment(s) still missing, not stitching", remaining));
            return Ok(summary(
                JobOutcome::Incomplete {
                    remaining,
                    failed,
                    timed_out,
                },
                generated,
                skipped,
            ));
        }

        let outcome = self.stitch_job(name, &plan, &audio, logger).await?;
        Ok(summary(outcome, generated, skipped))
    }

    async fn generate_segment(
        &self,
        name: &str,
        plan: &SegmentPlan,
        window: &SegmentWindow,
        image: &str,
        audio: &Path,
        clip: &Path,
    ) -> WorkerResult<Generation> {
        // A single window uses the source audio as-is.
        let window_audio = if plan.is_segmented() {
            let path = audio_segment_path(audio, window.index);
            self.media
                .extract_audio(audio, window.start, window.duration, &path)
                .await?;
            path
        } else {
            audio.to_path_buf()
        };

        let audio_ref = self.backend.upload(&window_audio).await?;
        let params = TalkingHeadParams {
            image: image.to_string(),
            audio: audio_ref,
            fps: plan.fps,
            num_frames: window.frames,
            steps: self.config.steps(),
            seed: random_seed(&mut rand::rng()),
        };
        let prompt = talking_head_prompt(&self.template, &params)?;

        let id = self.backend.submit(&prompt).await?;
        info!(job = %name, segment = window.index, prompt_id = %id, "Submitted segment");

        let outcome = self
            .backend
            .poll(&id, self.config.comfy.poll_timeout, self.config.comfy.poll_interval)
            .await?;
        let manifest = match outcome {
            PollOutcome::Completed { manifest, elapsed } => {
                info!(job = %name, segment = window.index, elapsed_secs = elapsed.as_secs(), "Remote job done");
                manifest
            }
            PollOutcome::Failed { reason, .. } => return Err(WorkerError::remote_failed(reason)),
            PollOutcome::TimedOut { elapsed } => return Ok(Generation::TimedOut(elapsed)),
        };

        let incoming = clip.with_extension("incoming");
        let downloads = self.backend.download(&manifest, &incoming).await;
        let video = downloads
            .iter()
            .filter(|d| d.artifact.is_video())
            .find_map(|d| d.path().map(Path::to_path_buf));

        let result = match video {
            Some(video) => match move_file(&video, clip).await {
                Ok(()) => verify_output(clip, self.config.min_segment_bytes)
                    .await
                    .map(|bytes| Generation::Produced { bytes })
                    .map_err(WorkerError::from),
                Err(e) => Err(e.into()),
            },
            None => Err(WorkerError::NoOutput(id.to_string())),
        };

        if let Err(e) = tokio::fs::remove_dir_all(&incoming).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove {}: {}", incoming.display(), e);
            }
        }
        result
    }

    async fn stitch_job(&self, name: &str, plan: &SegmentPlan, audio: &Path, logger: &JobLogger) -> WorkerResult<JobOutcome> {
        let final_path = self.config.final_output_path(name);
        let segments: Vec<PathBuf> = plan
            .windows
            .iter()
            .map(|w| self.config.segment_clip_path(name, w.index))
            .collect();

        logger.log_progress(&format!("stitching {} segment clip(s)", segments.len()));
        let result = async {
            self.media.stitch(&segments, audio, &final_path).await?;
            verify_output(&final_path, self.config.min_output_bytes).await
        }
        .await;

        match result {
            Ok(bytes) => {
                record_stitch(true);
                self.store.record_stitched(name, &final_path).await?;
                logger.log_completion(&format!("{} ({})", final_path.display(), format_mb(bytes)));
                Ok(JobOutcome::Completed { output: final_path })
            }
            Err(e) => {
                record_stitch(false);
                // A partial or undersized final file would read as completed on the next run.
                if let Err(cleanup) = remove_if_exists(&final_path).await {
                    warn!("Could not remove {}: {}", final_path.display(), cleanup);
                }
                let reason = e.diagnostic();
                logger.log_error(&format!("stitching failed: {}", reason));
                self.store.record_stitch_failed(name, &reason).await?;
                Ok(JobOutcome::StitchFailed(reason))
            }
        }
    }
}

//! Command implementations behind the `avgen` binary.
//!
//! Output here is for the operator and goes to stdout; diagnostics go
//! through tracing.

use std::path::Path;
use std::time::Duration;

use avgen_comfy::{ComfyClient, WorkflowTemplate};
use avgen_media::fs_utils::file_size;
use avgen_media::{check_ffmpeg, check_ffprobe};
use avgen_models::{PollOutcome, RemoteJobId, RemoteJobStatus};
use avgen_state::{JobsLog, JsonFileStore, LoggedJob, LoggedJobStatus, StateStore};
use tracing::{info, warn};

use crate::config::{load_jobs, PipelineConfig};
use crate::error::{WorkerError, WorkerResult};
use crate::media::FfmpegToolkit;
use crate::orchestrator::Orchestrator;
use crate::report::{format_mb, resume_status as render_resume_status, RunSummary};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Generate every configured job (or only `only`).
pub async fn run(config: &PipelineConfig, only: Option<&str>) -> WorkerResult<RunSummary> {
    let ffmpeg = check_ffmpeg()?;
    check_ffprobe()?;
    info!("Using ffmpeg at {}", ffmpeg.display());

    let mut jobs = load_jobs(&config.jobs_file).await?;
    if let Some(only) = only {
        jobs.retain(|job| job.name == only);
        if jobs.is_empty() {
            return Err(WorkerError::config_error(format!(
                "no job named '{}' in {}",
                only,
                config.jobs_file.display()
            )));
        }
    }

    let template = WorkflowTemplate::load(&config.workflow_file).await?;
    let client = ComfyClient::new(config.comfy.clone())?;
    tokio::fs::create_dir_all(&config.output_dir).await?;

    let planner = config.planner();
    println!("\n--- FantasyTalking Jobs (with resume) ---\n");
    println!(
        "  FPS: {} | Max frames: {} | Max duration/segment: {:.2}s",
        planner.fps,
        planner.max_frames,
        planner.max_window_secs()
    );
    if config.test_mode {
        println!("  TEST MODE: reduced frame count and {} sampler steps", config.steps());
    }

    let orchestrator = Orchestrator::new(
        config.clone(),
        JsonFileStore::new(&config.state_file),
        client,
        FfmpegToolkit::new(config.overlap),
        template,
    );
    let summary = orchestrator.run(&jobs).await?;
    println!("{}", summary.render());
    Ok(summary)
}

/// Print the resume state and what the next run will do.
pub async fn resume_status(config: &PipelineConfig) -> WorkerResult<()> {
    let state = JsonFileStore::new(&config.state_file).load().await;
    let jobs = match load_jobs(&config.jobs_file).await {
        Ok(jobs) => jobs,
        Err(e) => {
            warn!("{}", e);
            Vec::new()
        }
    };
    print!("{}", render_resume_status(&state, &jobs, &config.state_file));
    Ok(())
}

/// Service queue, GPU memory, resume state and produced files.
pub async fn status(config: &PipelineConfig, client: &ComfyClient) -> WorkerResult<()> {
    println!("\n--- ComfyUI Status ---\n");
    match client.queue().await {
        Ok(queue) => {
            println!("  Running: {} job(s)", queue.running);
            println!("  Pending: {} job(s)", queue.pending);
        }
        Err(e) => {
            println!("  Could not reach ComfyUI API at {}: {}", client.base_url(), e);
            return Ok(());
        }
    }

    match client.system_stats().await {
        Ok(stats) => {
            if let Some(gpu) = stats.devices.first() {
                println!(
                    "  GPU VRAM: {:.1}GB free / {:.1}GB total ({})",
                    gpu.vram_free as f64 / GIB,
                    gpu.vram_total as f64 / GIB,
                    gpu.name
                );
            }
        }
        Err(e) => warn!("system_stats failed: {}", e),
    }

    resume_status(config).await?;
    print_assets(&config.output_dir).await;
    Ok(())
}

async fn print_assets(dir: &Path) {
    println!("\n  Generated Assets:");
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => {
            println!("    {}: directory not found", dir.display());
            return;
        }
    };

    let mut files = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    println!("    {}: {} file(s)", dir.display(), files.len());
    for path in files {
        let size = file_size(&path).await.unwrap_or(0);
        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        println!("      {} ({})", name, format_mb(size));
    }
}

/// Queue an ad-hoc workflow and return immediately.
pub async fn queue(
    config: &PipelineConfig,
    client: &ComfyClient,
    workflow: &str,
    image: Option<&str>,
    prompt: Option<&str>,
) -> WorkerResult<RemoteJobId> {
    let path = config.named_workflow(workflow);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(WorkerError::config_error(format!(
            "workflow not found: {} (available: {})",
            path.display(),
            available_workflows(&config.workflows_dir).await.join(", ")
        )));
    }
    let mut template = WorkflowTemplate::load(&path).await?;

    if let Some(image) = image {
        // Local files are uploaded; anything else is taken as a name already on the server.
        let reference = if tokio::fs::try_exists(image).await.unwrap_or(false) {
            client.upload(image, None).await?.input_reference()
        } else {
            image.to_string()
        };
        if !template.set_first_load_image(&reference) {
            warn!("Workflow {} has no LoadImage node, image ignored", workflow);
        }
    }
    if let Some(prompt) = prompt {
        if !template.set_positive_prompt(prompt) {
            warn!("Workflow {} has no positive prompt node, prompt ignored", workflow);
        }
    }
    let seeds = template.randomize_seeds(&mut rand::rng());
    info!(workflow = %workflow, seeds = seeds, "Prepared workflow");

    let id = client.submit(&template.to_prompt()).await?;
    JobsLog::new(&config.jobs_log_file)
        .append(LoggedJob::queued(id.as_str(), workflow, image.map(str::to_string)))
        .await?;

    println!("Queued: {}", id);
    println!("  Check:  avgen check {}", id);
    println!("  Wait:   avgen wait {}", id);
    Ok(id)
}

async fn available_workflows(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().to_string());
                }
            }
        }
    }
    names.sort();
    names
}

/// Print the current status of a remote job.
pub async fn check(client: &ComfyClient, id: &RemoteJobId) -> WorkerResult<RemoteJobStatus> {
    let status = client.status(id).await?;
    match &status {
        RemoteJobStatus::Queued { position: Some(position) } => {
            println!("{}: pending (position {})", id, position)
        }
        RemoteJobStatus::Queued { position: None } => println!("{}: unknown (not yet visible)", id),
        RemoteJobStatus::Running => println!("{}: running", id),
        RemoteJobStatus::Completed(manifest) => {
            println!("{}: completed", id);
            if let Some(secs) = manifest.execution_time {
                println!("  Execution time: {:.1} min", secs / 60.0);
            }
            for artifact in &manifest.artifacts {
                println!("  {}", client.view_url(artifact));
            }
        }
        RemoteJobStatus::Failed(reason) => println!("{}: failed: {}", id, reason),
    }
    Ok(status)
}

/// Wait for a remote job, then download its outputs.
pub async fn wait(
    config: &PipelineConfig,
    client: &ComfyClient,
    id: &RemoteJobId,
    timeout: Duration,
    interval: Duration,
) -> WorkerResult<PollOutcome> {
    println!("Waiting for job {}...", id);
    println!("Timeout: {}s ({:.0} min)", timeout.as_secs(), timeout.as_secs_f64() / 60.0);
    println!("Poll interval: {}s", interval.as_secs());
    println!("{}", "-".repeat(50));

    let outcome = client.poll_until_done(id, timeout, interval).await?;
    let log = JobsLog::new(&config.jobs_log_file);

    match &outcome {
        PollOutcome::Completed { manifest, elapsed } => {
            println!("\nJOB COMPLETED in {:.1} minutes!", elapsed.as_secs_f64() / 60.0);
            let target = config.downloads_dir.join(id.short());
            for download in client.download(manifest, &target).await {
                match &download.result {
                    Ok((path, size)) => println!("  Downloaded: {} ({})", path.display(), format_mb(*size)),
                    Err(e) => println!("  Failed to download {}: {}", download.artifact.filename, e),
                }
            }
            log.mark_completed(id.as_str(), elapsed.as_secs_f64()).await?;
        }
        PollOutcome::Failed { reason, elapsed } => {
            println!("\nERROR: {}", reason);
            log.mark_finished(id.as_str(), LoggedJobStatus::Failed, elapsed.as_secs_f64())
                .await?;
        }
        PollOutcome::TimedOut { elapsed } => {
            println!("\nTIMEOUT after {:.1} minutes", elapsed.as_secs_f64() / 60.0);
        }
    }
    Ok(outcome)
}

/// Print recently queued ad-hoc jobs, newest first.
pub async fn list(config: &PipelineConfig, limit: usize) -> WorkerResult<()> {
    let jobs = JobsLog::new(&config.jobs_log_file).recent(limit).await;

    println!("\n{}", "=".repeat(60));
    println!("RECENT COMFYUI JOBS");
    println!("{}\n", "=".repeat(60));

    if jobs.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }
    for job in jobs {
        let id = RemoteJobId::from_string(job.prompt_id.as_str());
        let elapsed = job
            .elapsed_seconds
            .map(|secs| format!(" ({:.1} min)", secs / 60.0))
            .unwrap_or_default();
        println!(
            "  {}...  {:30}  {:10}  {}{}",
            id.short(),
            job.workflow,
            job.status.as_str(),
            job.queued_at.format("%Y-%m-%dT%H:%M:%S"),
            elapsed
        );
    }
    println!();
    Ok(())
}

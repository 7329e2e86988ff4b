use std::path::Path;

use avgen_comfy::{ComfyClient, WorkflowTemplate};
use avgen_media::{check_ffmpeg, check_ffprobe};
use avgen_worker::{load_jobs, PipelineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = PipelineConfig::from_env();

    println!(
        "avgen-selfcheck: starting with output_dir={}",
        config.output_dir.display()
    );
    ensure_tools()?;
    ensure_dir(&config.output_dir).await?;
    if let Some(parent) = config.state_file.parent() {
        ensure_dir(parent).await?;
    }
    ensure_workflow(&config.workflow_file).await?;
    ensure_jobs(&config).await?;
    check_service(&config).await;

    println!("avgen-selfcheck: ok");
    Ok(())
}

fn ensure_tools() -> anyhow::Result<()> {
    let ffmpeg = check_ffmpeg().map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;
    let ffprobe = check_ffprobe().map_err(|e| anyhow::anyhow!("ffprobe not available: {}", e))?;
    println!("  ffmpeg:  {}", ffmpeg.display());
    println!("  ffprobe: {}", ffprobe.display());
    Ok(())
}

async fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {}: {}", path.display(), e))
}

async fn ensure_workflow(path: &Path) -> anyhow::Result<()> {
    let template = WorkflowTemplate::load(path).await?;
    println!("  workflow: {} ({} nodes)", path.display(), template.node_count());
    Ok(())
}

async fn ensure_jobs(config: &PipelineConfig) -> anyhow::Result<()> {
    let jobs = load_jobs(&config.jobs_file).await?;
    println!("  jobs: {} in {}", jobs.len(), config.jobs_file.display());
    for job in &jobs {
        for path in [config.photo_path(job), config.audio_path(job)] {
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                println!("  warning: {}: missing {}", job.name, path.display());
            }
        }
    }
    Ok(())
}

/// Reachability is reported, not required.
async fn check_service(config: &PipelineConfig) {
    match ComfyClient::new(config.comfy.clone()) {
        Ok(client) if client.is_reachable().await => {
            println!("  comfyui: reachable at {}", client.base_url())
        }
        Ok(client) => println!("  warning: comfyui not reachable at {}", client.base_url()),
        Err(e) => println!("  warning: cannot build http client: {}", e),
    }
}

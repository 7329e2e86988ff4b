//! `avgen` command line.

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use avgen_comfy::ComfyClient;
use avgen_models::RemoteJobId;
use avgen_worker::logging::init_tracing;
use avgen_worker::{commands, PipelineConfig};

#[derive(Debug, Parser)]
#[command(name = "avgen", version, about = "Resumable talking-head generation via ComfyUI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate every configured job, resuming where the last run stopped
    Run {
        /// Shorter windows (49 frames) and 20 sampler steps
        #[arg(long)]
        test: bool,
        /// Only run the job with this name
        #[arg(long)]
        job: Option<String>,
    },
    /// Show the resume state and what the next run will do
    ResumeStatus,
    /// Show service queue, GPU memory, resume state and produced files
    Status,
    /// Queue an ad-hoc workflow and return immediately
    Queue {
        /// Workflow name (without .json) under the workflows directory
        #[arg(long, short)]
        workflow: String,
        /// Input image, local file or name already on the server
        #[arg(long, short)]
        image: Option<String>,
        /// Positive prompt text
        #[arg(long, short)]
        prompt: Option<String>,
    },
    /// Check the status of a queued job
    Check { prompt_id: String },
    /// Wait for a queued job and download its outputs
    Wait {
        prompt_id: String,
        /// Give up after this many seconds
        #[arg(long, default_value_t = 7200)]
        timeout: u64,
        /// Seconds between status checks
        #[arg(long, default_value_t = 30)]
        poll: u64,
    },
    /// List recently queued jobs
    List {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = PipelineConfig::from_env();
    info!("Config: {:?}", config);

    match execute(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Command, config: PipelineConfig) -> anyhow::Result<ExitCode> {
    let client = || ComfyClient::new(config.comfy.clone());

    match command {
        Command::Run { test, job } => {
            let config = config.clone().with_test_mode(test);
            let summary = commands::run(&config, job.as_deref()).await?;
            return Ok(if summary.all_done() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            });
        }
        Command::ResumeStatus => commands::resume_status(&config).await?,
        Command::Status => commands::status(&config, &client()?).await?,
        Command::Queue {
            workflow,
            image,
            prompt,
        } => {
            commands::queue(&config, &client()?, &workflow, image.as_deref(), prompt.as_deref()).await?;
        }
        Command::Check { prompt_id } => {
            commands::check(&client()?, &RemoteJobId::from_string(prompt_id)).await?;
        }
        Command::Wait {
            prompt_id,
            timeout,
            poll,
        } => {
            let outcome = commands::wait(
                &config,
                &client()?,
                &RemoteJobId::from_string(prompt_id),
                Duration::from_secs(timeout),
                Duration::from_secs(poll),
            )
            .await?;
            if !matches!(outcome, avgen_models::PollOutcome::Completed { .. }) {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::List { limit } => commands::list(&config, limit).await?,
    }
    Ok(ExitCode::SUCCESS)
}

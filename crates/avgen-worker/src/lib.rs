//! Resumable talking-head generation pipeline.
//!
//! This crate provides:
//! - The orchestrator: reconcile, resume report, sequential generation
//! - Seams for the generation service and the local media tools
//! - Configuration, logging and metrics
//! - The command implementations behind the `avgen` binary

pub mod backend;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod media;
pub mod metrics;
pub mod orchestrator;
pub mod report;

pub use backend::GenerationBackend;
pub use config::{load_jobs, PipelineConfig};
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use media::{FfmpegToolkit, MediaToolkit};
pub use orchestrator::Orchestrator;
pub use report::{JobOutcome, JobSummary, ResumeEntry, RunSummary};

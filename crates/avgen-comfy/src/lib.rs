//! ComfyUI client for the avgen pipeline.
//!
//! Maps the pipeline's remote job operations onto the ComfyUI HTTP API:
//! `/upload/image`, `/prompt`, `/history/{id}`, `/queue`, `/view` and
//! `/system_stats`.

pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod types;
pub mod workflow;

#[cfg(test)]
mod client_tests;

pub use client::{ArtifactDownload, ComfyClient};
pub use config::ComfyConfig;
pub use error::{ClientError, ClientResult};
pub use retry::{FailureTracker, RetryConfig};
pub use types::{DeviceStats, QueueSnapshot, SystemStats, UploadedFile};
pub use workflow::{random_seed, talking_head_prompt, TalkingHeadParams, WorkflowTemplate};

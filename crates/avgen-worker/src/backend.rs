//! Generation backend seam.
//!
//! The orchestrator talks to the remote service only through
//! [`GenerationBackend`], so tests can substitute a scripted backend.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use avgen_comfy::{ArtifactDownload, ClientResult, ComfyClient};
use avgen_models::{OutputManifest, PollOutcome, RemoteJobId};
use serde_json::Value;

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Upload an input file; returns the reference to put into the workflow.
    async fn upload(&self, path: &Path) -> ClientResult<String>;

    /// Submit a prompt graph.
    async fn submit(&self, prompt: &Value) -> ClientResult<RemoteJobId>;

    /// Wait for a submitted job to finish.
    async fn poll(&self, id: &RemoteJobId, timeout: Duration, interval: Duration) -> ClientResult<PollOutcome>;

    /// Fetch every artifact of a finished job into `target_dir`.
    async fn download(&self, manifest: &OutputManifest, target_dir: &Path) -> Vec<ArtifactDownload>;
}

#[async_trait]
impl GenerationBackend for ComfyClient {
    async fn upload(&self, path: &Path) -> ClientResult<String> {
        ComfyClient::upload(self, path, None)
            .await
            .map(|file| file.input_reference())
    }

    async fn submit(&self, prompt: &Value) -> ClientResult<RemoteJobId> {
        ComfyClient::submit(self, prompt).await
    }

    async fn poll(&self, id: &RemoteJobId, timeout: Duration, interval: Duration) -> ClientResult<PollOutcome> {
        self.poll_until_done(id, timeout, interval).await
    }

    async fn download(&self, manifest: &OutputManifest, target_dir: &Path) -> Vec<ArtifactDownload> {
        ComfyClient::download(self, manifest, target_dir).await
    }
}

//! ComfyUI HTTP client.
//!
//! - Multipart uploads of input artifacts
//! - Prompt submission with retry on transient failures
//! - Status decoding from history and queue
//! - Poll loop that separates failure from timeout
//! - Per-artifact downloads

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use avgen_models::{ArtifactRef, OutputManifest, PollOutcome, RemoteJobId, RemoteJobStatus};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::ComfyConfig;
use crate::error::{ClientError, ClientResult};
use crate::metrics::{record_job_outcome, record_request};
use crate::retry::{with_retry, FailureTracker};
use crate::types::{
    HistoryEntry, PromptRequest, PromptResponse, QueueResponse, QueueSnapshot, SystemStats,
    UploadedFile,
};

/// Poll errors logged before further ones are suppressed.
const MAX_LOGGED_POLL_ERRORS: u32 = 5;

/// Result of fetching one artifact.
#[derive(Debug)]
pub struct ArtifactDownload {
    pub artifact: ArtifactRef,
    /// Local path and size on success
    pub result: ClientResult<(PathBuf, u64)>,
}

impl ArtifactDownload {
    pub fn path(&self) -> Option<&Path> {
        self.result.as_ref().ok().map(|(p, _)| p.as_path())
    }
}

/// ComfyUI REST API client.
#[derive(Debug, Clone)]
pub struct ComfyClient {
    http: Client,
    config: ComfyConfig,
    client_id: String,
}

impl ComfyClient {
    pub fn new(config: ComfyConfig) -> ClientResult<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .user_agent(concat!("avgen-comfy/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            config,
            client_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    pub fn from_env() -> ClientResult<Self> {
        Self::new(ComfyConfig::from_env())
    }

    pub fn config(&self) -> &ComfyConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// `/view` URL of an artifact.
    pub fn view_url(&self, artifact: &ArtifactRef) -> String {
        format!(
            "{}/view?filename={}&subfolder={}&type={}",
            self.config.base_url,
            urlencoding::encode(&artifact.filename),
            urlencoding::encode(&artifact.subfolder),
            urlencoding::encode(&artifact.storage)
        )
    }

    async fn execute_request<T, F>(&self, operation: &str, fut: F) -> ClientResult<T>
    where
        F: std::future::Future<Output = ClientResult<T>>,
    {
        let span = info_span!("comfyui_request", operation = %operation);

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(0),
        };
        record_request(operation, status, latency_ms);

        result
    }

    async fn check_status(url: &str, response: Response) -> ClientResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::from_http_status(
            status.as_u16(),
            format!("{} failed: {}", url, body.trim()),
        ))
    }

    async fn get_json<T: DeserializeOwned>(&self, operation: &str, path: &str) -> ClientResult<T> {
        let url = self.url(path);
        self.execute_request(operation, async {
            let response = self
                .http
                .get(&url)
                .timeout(self.config.timeout)
                .send()
                .await?;
            let response = Self::check_status(&url, response).await?;
            let bytes = response.bytes().await?;
            serde_json::from_slice(&bytes).map_err(|e| {
                ClientError::invalid_response(format!("{}: {}", url, e))
            })
        })
        .await
    }

    /// Upload an input file (image or audio) to the service's input folder.
    pub async fn upload(&self, path: impl AsRef<Path>, subfolder: Option<&str>) -> ClientResult<UploadedFile> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ClientError::workflow(format!("not a file: {}", path.display())))?;
        let bytes = tokio::fs::read(path).await?;
        let url = self.url("/upload/image");

        let uploaded = with_retry(&self.config.retry, "upload", || {
            let bytes = bytes.clone();
            let file_name = file_name.clone();
            let url = url.clone();
            async move {
                self.execute_request("upload", async {
                    let part = Part::bytes(bytes)
                        .file_name(file_name)
                        .mime_str("application/octet-stream")?;
                    let mut form = Form::new()
                        .part("image", part)
                        .text("type", "input")
                        .text("overwrite", "true");
                    if let Some(subfolder) = subfolder.filter(|s| !s.is_empty()) {
                        form = form.text("subfolder", subfolder.to_string());
                    }

                    let response = self
                        .http
                        .post(&url)
                        .timeout(self.config.transfer_timeout)
                        .multipart(form)
                        .send()
                        .await?;
                    let response = Self::check_status(&url, response).await?;
                    let bytes = response.bytes().await?;
                    serde_json::from_slice::<UploadedFile>(&bytes)
                        .map_err(|e| ClientError::invalid_response(format!("upload response: {}", e)))
                })
                .await
            }
        })
        .await?;

        info!("Uploaded: {} as {}", path.display(), uploaded.input_reference());
        Ok(uploaded)
    }

    /// Submit a prompt graph. Returns the service-assigned job id.
    pub async fn submit(&self, prompt: &Value) -> ClientResult<RemoteJobId> {
        let url = self.url("/prompt");
        let body = PromptRequest {
            prompt,
            client_id: &self.client_id,
        };

        let response: PromptResponse = with_retry(&self.config.retry, "submit", || async {
            self.execute_request("submit", async {
                let response = self
                    .http
                    .post(&url)
                    .timeout(self.config.timeout)
                    .json(&body)
                    .send()
                    .await?;
                let response = Self::check_status(&url, response).await?;
                let bytes = response.bytes().await?;
                serde_json::from_slice::<PromptResponse>(&bytes)
                    .map_err(|e| ClientError::invalid_response(format!("prompt response: {}", e)))
            })
            .await
        })
        .await?;

        if let Some(errors) = response.node_errors.as_object().filter(|m| !m.is_empty()) {
            return Err(ClientError::Rejected(
                200,
                format!("node errors: {}", Value::Object(errors.clone())),
            ));
        }

        let id = response
            .prompt_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ClientError::invalid_response("prompt response has no prompt_id"))?;

        debug!(number = ?response.number, "Submitted prompt {}", id);
        Ok(RemoteJobId::from_string(id))
    }

    /// Current status of a remote job.
    ///
    /// A job found in neither history nor queue is reported as queued with
    /// no position; the service may not have registered it yet.
    pub async fn status(&self, id: &RemoteJobId) -> ClientResult<RemoteJobStatus> {
        let path = format!("/history/{}", urlencoding::encode(id.as_str()));
        let mut history: serde_json::Map<String, Value> = self.get_json("history", &path).await?;

        if let Some(entry) = history.remove(id.as_str()) {
            let entry: HistoryEntry = serde_json::from_value(entry)
                .map_err(|e| ClientError::invalid_response(format!("history entry: {}", e)))?;
            return Ok(entry.into_status());
        }

        let queue: QueueResponse = self.get_json("queue", "/queue").await?;
        Ok(queue
            .locate(id.as_str())
            .unwrap_or(RemoteJobStatus::Queued { position: None }))
    }

    /// Poll until the job completes, fails or `timeout` elapses.
    ///
    /// Transient errors (network, 5xx, malformed or missing status replies)
    /// are logged and polling continues; they never turn into a failed job.
    /// Other errors abort the loop.
    pub async fn poll_until_done(
        &self,
        id: &RemoteJobId,
        timeout: Duration,
        interval: Duration,
    ) -> ClientResult<PollOutcome> {
        let start = Instant::now();
        let mut tracker = FailureTracker::new(MAX_LOGGED_POLL_ERRORS);
        let mut last_status: Option<&'static str> = None;

        loop {
            match self.status(id).await {
                Ok(RemoteJobStatus::Completed(manifest)) => {
                    let elapsed = start.elapsed();
                    record_job_outcome("completed", elapsed.as_secs_f64());
                    info!(
                        prompt_id = %id,
                        elapsed_secs = elapsed.as_secs(),
                        outputs = manifest.artifacts.len(),
                        "Remote job completed"
                    );
                    return Ok(PollOutcome::Completed { manifest, elapsed });
                }
                Ok(RemoteJobStatus::Failed(reason)) => {
                    let elapsed = start.elapsed();
                    record_job_outcome("failed", elapsed.as_secs_f64());
                    warn!(prompt_id = %id, "Remote job failed: {}", reason);
                    return Ok(PollOutcome::Failed { reason, elapsed });
                }
                Ok(status) => {
                    tracker.record_success();
                    if last_status != Some(status.as_str()) {
                        info!(prompt_id = %id, status = %status, "Remote job status");
                        last_status = Some(status.as_str());
                    } else {
                        debug!(
                            prompt_id = %id,
                            elapsed_secs = start.elapsed().as_secs(),
                            "Polling..."
                        );
                    }
                }
                Err(e) if e.is_transient_for_poll() => {
                    if tracker.record_failure() {
                        warn!(prompt_id = %id, "Status check failed, will retry: {}", e);
                    }
                }
                Err(e) => return Err(e),
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                record_job_outcome("timed_out", elapsed.as_secs_f64());
                warn!(
                    prompt_id = %id,
                    elapsed_secs = elapsed.as_secs(),
                    "Timed out waiting for remote job"
                );
                return Ok(PollOutcome::TimedOut { elapsed });
            }
            tokio::time::sleep(interval.min(timeout - elapsed)).await;
        }
    }

    /// Download one artifact to `dest`, via a `.part` file.
    pub async fn download_artifact(&self, artifact: &ArtifactRef, dest: impl AsRef<Path>) -> ClientResult<u64> {
        let dest = dest.as_ref();
        let url = self.view_url(artifact);
        let partial = dest.with_extension("part");

        let result = self
            .execute_request("download", async {
                let response = self
                    .http
                    .get(&url)
                    .timeout(self.config.transfer_timeout)
                    .send()
                    .await?;
                let mut response = Self::check_status(&url, response).await?;

                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let mut file = tokio::fs::File::create(&partial).await?;
                let mut written = 0u64;
                while let Some(chunk) = response.chunk().await? {
                    file.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
                file.flush().await?;
                drop(file);
                tokio::fs::rename(&partial, dest).await?;
                Ok(written)
            })
            .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&partial).await;
        }
        result
    }

    /// Download every artifact of `manifest` into `target_dir`.
    ///
    /// Each artifact is reported on its own; one failure does not stop the
    /// others.
    pub async fn download(&self, manifest: &OutputManifest, target_dir: impl AsRef<Path>) -> Vec<ArtifactDownload> {
        let target_dir = target_dir.as_ref();
        let mut results = Vec::with_capacity(manifest.artifacts.len());

        for artifact in &manifest.artifacts {
            let dest = target_dir.join(artifact.local_file_name());
            let result = self
                .download_artifact(artifact, &dest)
                .await
                .map(|size| (dest.clone(), size));
            match &result {
                Ok((path, size)) => info!(bytes = size, "Downloaded: {}", path.display()),
                Err(e) => warn!("Download failed ({}): {}", artifact.filename, e),
            }
            results.push(ArtifactDownload {
                artifact: artifact.clone(),
                result,
            });
        }

        results
    }

    /// Running and pending queue depth.
    pub async fn queue(&self) -> ClientResult<QueueSnapshot> {
        let queue: QueueResponse = self.get_json("queue", "/queue").await?;
        Ok(queue.snapshot())
    }

    /// Device statistics (GPU memory).
    pub async fn system_stats(&self) -> ClientResult<SystemStats> {
        self.get_json("system_stats", "/system_stats").await
    }

    /// True when the service answers `/system_stats`.
    pub async fn is_reachable(&self) -> bool {
        match self.system_stats().await {
            Ok(_) => true,
            Err(e) => {
                debug!("ComfyUI not reachable at {}: {}", self.config.base_url, e);
                false
            }
        }
    }
}

//! ComfyUI wire types.
//!
//! Everything the service returns is decoded here and converted into the
//! shared [`avgen_models`] types; nothing outside this crate sees raw JSON.

use std::collections::BTreeMap;

use avgen_models::{ArtifactKind, ArtifactRef, OutputManifest, RemoteJobStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `POST /prompt` body.
#[derive(Debug, Serialize)]
pub struct PromptRequest<'a> {
    pub prompt: &'a Value,
    pub client_id: &'a str,
}

/// `POST /prompt` response.
#[derive(Debug, Deserialize)]
pub struct PromptResponse {
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub number: Option<u64>,
    #[serde(default)]
    pub node_errors: Value,
}

/// `POST /upload/image` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedFile {
    /// Name the service stored the file under (may differ on collision)
    pub name: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default)]
    pub storage: String,
}

impl UploadedFile {
    /// Reference usable as a loader node input (`subfolder/name`).
    pub fn input_reference(&self) -> String {
        if self.subfolder.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.subfolder, self.name)
        }
    }
}

/// One entry of `GET /history/{id}`.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub status: Option<HistoryStatus>,
    #[serde(default)]
    pub outputs: BTreeMap<String, NodeOutput>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryStatus {
    #[serde(default)]
    pub status_str: Option<String>,
    #[serde(default)]
    pub completed: bool,
    /// `[event_name, payload]` pairs
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default)]
    pub execution_time: Option<f64>,
}

/// Files produced by one output node.
#[derive(Debug, Default, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub gifs: Vec<FileRef>,
    #[serde(default)]
    pub videos: Vec<FileRef>,
    #[serde(default)]
    pub images: Vec<FileRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileRef {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_storage")]
    pub storage: String,
}

fn default_storage() -> String {
    "output".to_string()
}

impl FileRef {
    fn into_artifact(self, kind: ArtifactKind) -> ArtifactRef {
        ArtifactRef {
            filename: self.filename,
            subfolder: self.subfolder,
            storage: self.storage,
            kind,
        }
    }
}

impl HistoryEntry {
    /// First `execution_error` message, if the run failed.
    pub fn execution_error(&self) -> Option<String> {
        let status = self.status.as_ref()?;
        for message in &status.messages {
            let Some(pair) = message.as_array() else {
                continue;
            };
            if pair.first().and_then(Value::as_str) != Some("execution_error") {
                continue;
            }
            let payload = pair.get(1);
            let text = payload
                .and_then(|p| p.get("exception_message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            let node = payload
                .and_then(|p| p.get("node_type"))
                .and_then(Value::as_str);
            return Some(match node {
                Some(node) => format!("{} ({})", text.trim(), node),
                None => text.trim().to_string(),
            });
        }
        if status.status_str.as_deref() == Some("error") {
            return Some("execution failed".to_string());
        }
        None
    }

    /// Collect every output file, videos first in node order.
    pub fn manifest(self) -> OutputManifest {
        let execution_time = self.status.as_ref().and_then(|s| s.execution_time);
        let mut videos = Vec::new();
        let mut images = Vec::new();
        for (_, node) in self.outputs {
            videos.extend(
                node.gifs
                    .into_iter()
                    .chain(node.videos)
                    .filter(|f| !f.filename.is_empty())
                    .map(|f| f.into_artifact(ArtifactKind::Video)),
            );
            images.extend(
                node.images
                    .into_iter()
                    .filter(|f| !f.filename.is_empty())
                    .map(|f| f.into_artifact(ArtifactKind::Image)),
            );
        }
        videos.extend(images);
        OutputManifest {
            artifacts: videos,
            execution_time,
        }
    }

    /// Interpret the entry. Entries only appear once execution ended, so an
    /// entry without a verdict but with outputs counts as completed.
    pub fn into_status(self) -> RemoteJobStatus {
        if let Some(reason) = self.execution_error() {
            return RemoteJobStatus::Failed(reason);
        }
        let finished = match &self.status {
            Some(s) => s.completed || s.status_str.as_deref() == Some("success"),
            None => !self.outputs.is_empty(),
        };
        if finished {
            RemoteJobStatus::Completed(self.manifest())
        } else {
            RemoteJobStatus::Running
        }
    }
}

/// `GET /queue` response. Items are `[number, prompt_id, prompt, extra, outputs]`.
#[derive(Debug, Default, Deserialize)]
pub struct QueueResponse {
    #[serde(default)]
    pub queue_running: Vec<Vec<Value>>,
    #[serde(default)]
    pub queue_pending: Vec<Vec<Value>>,
}

fn item_prompt_id(item: &[Value]) -> Option<&str> {
    item.get(1).and_then(Value::as_str)
}

impl QueueResponse {
    /// Where `prompt_id` sits in the queue, if anywhere.
    pub fn locate(&self, prompt_id: &str) -> Option<RemoteJobStatus> {
        if self
            .queue_running
            .iter()
            .any(|item| item_prompt_id(item) == Some(prompt_id))
        {
            return Some(RemoteJobStatus::Running);
        }
        self.queue_pending
            .iter()
            .position(|item| item_prompt_id(item) == Some(prompt_id))
            .map(|i| RemoteJobStatus::Queued {
                position: Some(i + 1),
            })
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            running: self.queue_running.len(),
            pending: self.queue_pending.len(),
        }
    }
}

/// Queue depth summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub running: usize,
    pub pending: usize,
}

/// `GET /system_stats` response (subset).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemStats {
    #[serde(default)]
    pub devices: Vec<DeviceStats>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceStats {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub device_type: String,
    #[serde(default)]
    pub vram_total: u64,
    #[serde(default)]
    pub vram_free: u64,
}

impl DeviceStats {
    pub fn vram_used(&self) -> u64 {
        self.vram_total.saturating_sub(self.vram_free)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(value: Value) -> HistoryEntry {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_completed_entry_collects_all_outputs() {
        let status = entry(json!({
            "status": {"status_str": "success", "completed": true, "messages": [], "execution_time": 1834.2},
            "outputs": {
                "81": {"gifs": [{"filename": "FantasyTalking_00012.mp4", "subfolder": "", "type": "output"}]},
                "90": {"images": [{"filename": "preview.png", "subfolder": "thumbs", "type": "temp"}]}
            }
        }))
        .into_status();

        let RemoteJobStatus::Completed(manifest) = status else {
            panic!("expected completed, got {:?}", status);
        };
        assert_eq!(manifest.artifacts.len(), 2);
        assert!(manifest.artifacts[0].is_video());
        assert_eq!(manifest.artifacts[0].filename, "FantasyTalking_00012.mp4");
        assert_eq!(manifest.artifacts[1].kind, ArtifactKind::Image);
        assert_eq!(manifest.artifacts[1].storage, "temp");
        assert_eq!(manifest.execution_time, Some(1834.2));
    }

    #[test]
    fn test_execution_error_is_failure() {
        let status = entry(json!({
            "status": {
                "status_str": "error",
                "completed": false,
                "messages": [
                    ["execution_start", {"prompt_id": "abc"}],
                    ["execution_error", {"exception_message": "CUDA out of memory\n", "node_type": "WanVideoSampler"}]
                ]
            },
            "outputs": {}
        }))
        .into_status();

        assert_eq!(
            status,
            RemoteJobStatus::Failed("CUDA out of memory (WanVideoSampler)".to_string())
        );
    }

    #[test]
    fn test_error_status_without_message() {
        let status = entry(json!({"status": {"status_str": "error"}})).into_status();
        assert!(matches!(status, RemoteJobStatus::Failed(_)));
    }

    #[test]
    fn test_entry_without_verdict() {
        assert_eq!(entry(json!({"outputs": {}})).into_status(), RemoteJobStatus::Running);
        let status = entry(json!({"outputs": {"9": {"videos": [{"filename": "a.mp4"}]}}})).into_status();
        assert!(matches!(status, RemoteJobStatus::Completed(_)));
    }

    #[test]
    fn test_queue_locate() {
        let queue: QueueResponse = serde_json::from_value(json!({
            "queue_running": [[41, "running-id", {}, {}, []]],
            "queue_pending": [[42, "first", {}, {}, []], [43, "second", {}, {}, []]]
        }))
        .unwrap();

        assert_eq!(queue.locate("running-id"), Some(RemoteJobStatus::Running));
        assert_eq!(
            queue.locate("second"),
            Some(RemoteJobStatus::Queued { position: Some(2) })
        );
        assert_eq!(queue.locate("missing"), None);
        assert_eq!(queue.snapshot(), QueueSnapshot { running: 1, pending: 2 });
    }

    #[test]
    fn test_uploaded_file_reference() {
        let file: UploadedFile =
            serde_json::from_value(json!({"name": "seg01.wav", "subfolder": "avgen", "type": "input"})).unwrap();
        assert_eq!(file.input_reference(), "avgen/seg01.wav");
    }
}

//! Remote generation job types.
//!
//! Service responses are decoded once into these types at the client
//! boundary; call sites never inspect raw JSON.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identifier returned by the generation service on submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteJobId(pub String);

impl RemoteJobId {
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for compact listings.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for RemoteJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category of an output artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Video,
    Image,
}

/// Reference to one output file held by the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// Storage bucket on the service side (`output`, `temp`, ...)
    #[serde(rename = "type", default = "default_storage")]
    pub storage: String,
    #[serde(default = "default_kind")]
    pub kind: ArtifactKind,
}

fn default_storage() -> String {
    "output".to_string()
}

fn default_kind() -> ArtifactKind {
    ArtifactKind::Video
}

impl ArtifactRef {
    pub fn is_video(&self) -> bool {
        self.kind == ArtifactKind::Video
    }

    /// File name safe to join onto a local directory.
    pub fn local_file_name(&self) -> String {
        Path::new(&self.filename)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "output.mp4".to_string())
    }
}

/// Output manifest of a completed remote job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutputManifest {
    pub artifacts: Vec<ArtifactRef>,
    /// Service-reported execution time in seconds, when available
    #[serde(default)]
    pub execution_time: Option<f64>,
}

impl OutputManifest {
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Status of a remote job as reported by the service.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteJobStatus {
    /// Waiting in the service queue; `None` when not yet visible anywhere
    Queued { position: Option<usize> },
    /// Currently executing
    Running,
    /// Finished with outputs
    Completed(OutputManifest),
    /// The service reported an explicit error
    Failed(String),
}

impl RemoteJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteJobStatus::Queued { .. } => "queued",
            RemoteJobStatus::Running => "running",
            RemoteJobStatus::Completed(_) => "completed",
            RemoteJobStatus::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for RemoteJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of waiting on a remote job.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed {
        manifest: OutputManifest,
        elapsed: Duration,
    },
    Failed {
        reason: String,
        elapsed: Duration,
    },
    /// No definitive answer before the deadline; the job may still run remotely
    TimedOut { elapsed: Duration },
}

impl PollOutcome {
    pub fn elapsed(&self) -> Duration {
        match self {
            PollOutcome::Completed { elapsed, .. }
            | PollOutcome::Failed { elapsed, .. }
            | PollOutcome::TimedOut { elapsed } => *elapsed,
        }
    }
}

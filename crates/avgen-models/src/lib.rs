//! Shared data models for the avgen pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Job definitions and persisted per-job progress
//! - The process-wide generation state document
//! - Segment plans
//! - Remote job identifiers, statuses and output manifests

pub mod job;
pub mod plan;
pub mod remote;
pub mod state;

// Re-export common types
pub use job::{JobRecord, JobSpec, JobStatus, RecordError, ResumeAction};
pub use plan::{SegmentPlan, SegmentWindow};
pub use remote::{
    ArtifactKind, ArtifactRef, OutputManifest, PollOutcome, RemoteJobId, RemoteJobStatus,
};
pub use state::GenerationState;

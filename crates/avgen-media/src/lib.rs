#![deny(unreachable_patterns)]
//! Media side of the avgen pipeline.
//!
//! This crate provides:
//! - The segmentation planner (pure)
//! - Type-safe FFmpeg command building and a runner with stderr capture
//! - FFprobe duration probing
//! - Audio window extraction
//! - Crossfade stitching with the original audio re-attached

pub mod command;
pub mod error;
pub mod filters;
pub mod fs_utils;
pub mod planner;
pub mod probe;
pub mod progress;
pub mod segment;
pub mod stitch;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use planner::{plan_segments, plan_windows, quantize_frames, PlanError, SegmentPlanner};
pub use probe::{probe_duration, probe_media, MediaInfo};
pub use progress::FfmpegProgress;
pub use segment::{audio_segment_path, extract_audio_segment};
pub use stitch::{stitch_segments, Stitcher};

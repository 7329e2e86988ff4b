//! Segmentation planner.
//!
//! Splits a source audio duration into overlapping windows that each fit
//! the generation model's frame limit. Everything here is pure and
//! deterministic; the same inputs always yield the same plan.

use avgen_models::{SegmentPlan, SegmentWindow};
use thiserror::Error;

/// Native frame rate of the talking-head model.
pub const DEFAULT_FPS: f64 = 23.0;
/// Maximum frames per request in production mode.
pub const DEFAULT_MAX_FRAMES: u32 = 81;
/// Maximum frames per request in test mode.
pub const TEST_MAX_FRAMES: u32 = 49;
/// Smallest frame count the model accepts.
pub const DEFAULT_MIN_FRAMES: u32 = 17;
/// Window overlap, also used as the stitch crossfade.
pub const DEFAULT_OVERLAP_SECS: f64 = 0.3;
/// Tails shorter than this are merged into the previous window.
pub const DEFAULT_MIN_TAIL_SECS: f64 = 1.0;

const EPSILON: f64 = 1e-9;

/// Rejected planner input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("invalid audio duration: {0}")]
    InvalidDuration(f64),

    #[error("invalid overlap: {0}")]
    InvalidOverlap(f64),

    #[error("window length {max_secs:.3}s must exceed overlap {overlap:.3}s")]
    WindowTooShort { max_secs: f64, overlap: f64 },

    #[error("invalid frame settings: fps={fps}, min_frames={min_frames}, max_frames={max_frames}")]
    InvalidFrames {
        fps: f64,
        min_frames: u32,
        max_frames: u32,
    },
}

/// Compute `(start, duration)` windows for audio of `duration` seconds.
///
/// `max_window` is the longest window the model can render and `overlap` the
/// shared span between consecutive windows. A trailing window shorter than
/// `min_tail` is folded into its predecessor: the span of the last two
/// windows is re-split into two equal windows that still overlap by exactly
/// `overlap`.
pub fn plan_windows(
    duration: f64,
    max_window: f64,
    overlap: f64,
    min_tail: f64,
) -> Result<Vec<(f64, f64)>, PlanError> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(PlanError::InvalidDuration(duration));
    }
    if !overlap.is_finite() || overlap < 0.0 {
        return Err(PlanError::InvalidOverlap(overlap));
    }
    if !max_window.is_finite() || max_window <= overlap {
        return Err(PlanError::WindowTooShort {
            max_secs: max_window,
            overlap,
        });
    }

    if duration <= max_window + EPSILON {
        return Ok(vec![(0.0, duration)]);
    }

    let step = max_window - overlap;
    let mut windows = Vec::new();
    let mut index: u32 = 0;
    loop {
        // Multiply rather than accumulate so long inputs do not drift.
        let start = step * index as f64;
        let end = start + max_window;
        if end >= duration - EPSILON {
            windows.push((start, duration - start));
            break;
        }
        windows.push((start, max_window));
        index += 1;
    }

    merge_sliver(&mut windows, duration, overlap, min_tail);
    Ok(windows)
}

/// [`plan_windows`] with the default one-second tail policy.
pub fn plan_segments(
    duration: f64,
    max_window: f64,
    overlap: f64,
) -> Result<Vec<(f64, f64)>, PlanError> {
    plan_windows(duration, max_window, overlap, DEFAULT_MIN_TAIL_SECS)
}

fn merge_sliver(windows: &mut Vec<(f64, f64)>, duration: f64, overlap: f64, min_tail: f64) {
    let n = windows.len();
    if n < 2 {
        return;
    }
    let (_, tail) = windows[n - 1];
    if tail >= min_tail {
        return;
    }

    let (prev_start, prev_len) = windows[n - 2];
    let span = duration - prev_start;
    let half = (span + overlap) / 2.0;
    // Both halves must remain real windows that fit the model.
    if half <= overlap || half > prev_len + EPSILON {
        return;
    }

    windows[n - 2] = (prev_start, half);
    windows[n - 1] = (prev_start + half - overlap, duration - (prev_start + half - overlap));
}

/// Quantize a window length to a valid frame count.
///
/// The model only accepts counts of the form `4k + 1`. The result covers the
/// window (`frames / fps >= duration`) unless clamped to `max_frames`.
pub fn quantize_frames(duration: f64, fps: f64, min_frames: u32, max_frames: u32) -> u32 {
    let raw = (duration * fps - EPSILON).ceil().max(1.0) as u32;
    let k = (raw.saturating_sub(1) + 3) / 4;
    let frames = 4 * k + 1;
    frames.clamp(min_frames, max_frames)
}

/// Planner configuration shared by the orchestrator and the stitcher.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPlanner {
    pub fps: f64,
    pub max_frames: u32,
    pub min_frames: u32,
    pub overlap: f64,
    pub min_tail: f64,
}

impl Default for SegmentPlanner {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            max_frames: DEFAULT_MAX_FRAMES,
            min_frames: DEFAULT_MIN_FRAMES,
            overlap: DEFAULT_OVERLAP_SECS,
            min_tail: DEFAULT_MIN_TAIL_SECS,
        }
    }
}

impl SegmentPlanner {
    /// Planner for quick smoke runs (shorter windows).
    pub fn test_mode() -> Self {
        Self {
            max_frames: TEST_MAX_FRAMES,
            ..Self::default()
        }
    }

    /// Longest window the model can render, in seconds.
    pub fn max_window_secs(&self) -> f64 {
        self.max_frames as f64 / self.fps
    }

    /// Build the plan for audio of `duration` seconds.
    pub fn plan(&self, duration: f64) -> Result<SegmentPlan, PlanError> {
        if !self.fps.is_finite()
            || self.fps <= 0.0
            || self.min_frames == 0
            || self.min_frames > self.max_frames
        {
            return Err(PlanError::InvalidFrames {
                fps: self.fps,
                min_frames: self.min_frames,
                max_frames: self.max_frames,
            });
        }

        let windows = plan_windows(duration, self.max_window_secs(), self.overlap, self.min_tail)?
            .into_iter()
            .enumerate()
            .map(|(i, (start, len))| SegmentWindow {
                index: i as u32,
                start,
                duration: len,
                frames: quantize_frames(len, self.fps, self.min_frames, self.max_frames),
            })
            .collect();

        Ok(SegmentPlan {
            windows,
            overlap: self.overlap,
            fps: self.fps,
        })
    }
}

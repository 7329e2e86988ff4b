//! Segment plan types.
//!
//! A plan is derived from the audio duration and configuration on every
//! run and is never persisted.

use serde::{Deserialize, Serialize};

/// One time window of the source audio, generated as one remote job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentWindow {
    /// 0-based position in the plan
    pub index: u32,
    /// Offset into the source audio, in seconds
    pub start: f64,
    /// Window length in seconds
    pub duration: f64,
    /// Quantized frame count requested from the service
    pub frames: u32,
}

impl SegmentWindow {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Ordered, overlapping windows covering the whole source audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentPlan {
    pub windows: Vec<SegmentWindow>,
    /// Overlap between consecutive windows, in seconds
    pub overlap: f64,
    /// Frame rate used for quantization
    pub fps: f64,
}

impl SegmentPlan {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// True when the audio had to be split.
    pub fn is_segmented(&self) -> bool {
        self.windows.len() > 1
    }

    /// End of the last window (equals the source duration).
    pub fn total_duration(&self) -> f64 {
        self.windows.last().map(|w| w.end()).unwrap_or(0.0)
    }

    /// Length of the timeline after crossfading every window by `overlap`.
    pub fn stitched_duration(&self) -> f64 {
        let sum: f64 = self.windows.iter().map(|w| w.duration).sum();
        sum - self.overlap * self.windows.len().saturating_sub(1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stitched_duration_matches_source() {
        let plan = SegmentPlan {
            windows: vec![
                SegmentWindow { index: 0, start: 0.0, duration: 3.5, frames: 81 },
                SegmentWindow { index: 1, start: 3.2, duration: 3.5, frames: 81 },
                SegmentWindow { index: 2, start: 6.4, duration: 2.6, frames: 61 },
            ],
            overlap: 0.3,
            fps: 23.0,
        };
        assert!((plan.total_duration() - 9.0).abs() < 1e-9);
        assert!((plan.stitched_duration() - 9.0).abs() < 1e-9);
        assert!(plan.is_segmented());
    }
}

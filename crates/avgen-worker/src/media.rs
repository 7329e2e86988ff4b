//! Local media tool seam.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use avgen_media::{extract_audio_segment, probe_duration, MediaResult, Stitcher};

#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Duration of a media file in seconds.
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64>;

    /// Cut `[start, start + duration)` of `source` into `output`.
    async fn extract_audio(&self, source: &Path, start: f64, duration: f64, output: &Path) -> MediaResult<()>;

    /// Join `segments` in order and attach `audio`, writing `output`.
    async fn stitch(&self, segments: &[PathBuf], audio: &Path, output: &Path) -> MediaResult<()>;
}

/// [`MediaToolkit`] backed by ffmpeg and ffprobe.
#[derive(Debug, Clone, Default)]
pub struct FfmpegToolkit {
    stitcher: Stitcher,
}

impl FfmpegToolkit {
    /// Toolkit whose stitch crossfade equals the planner overlap.
    pub fn new(crossfade: f64) -> Self {
        Self {
            stitcher: Stitcher::with_crossfade(crossfade),
        }
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        probe_duration(path).await
    }

    async fn extract_audio(&self, source: &Path, start: f64, duration: f64, output: &Path) -> MediaResult<()> {
        extract_audio_segment(source, start, duration, output)
            .await
            .map(|_| ())
    }

    async fn stitch(&self, segments: &[PathBuf], audio: &Path, output: &Path) -> MediaResult<()> {
        self.stitcher.stitch(segments, audio, output).await.map(|_| ())
    }
}

//! Segment stitching.
//!
//! Generated clips are joined with video crossfades, then the original
//! unsplit narration is muxed back on so the soundtrack never carries seams.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::{build_xfade_chain, crossfaded_duration};
use crate::fs_utils::remove_if_exists;
use crate::planner::DEFAULT_OVERLAP_SECS;
use crate::probe::probe_duration;
use crate::progress::FfmpegProgress;

/// Encoding settings for the final output.
#[derive(Debug, Clone, PartialEq)]
pub struct Stitcher {
    /// Crossfade between consecutive clips; must equal the planner overlap
    pub crossfade: f64,
    pub crf: u8,
    pub preset: String,
    pub audio_bitrate: String,
    /// Timeout for the crossfade encode
    pub encode_timeout_secs: u64,
    /// Timeout for stream-copy muxing
    pub mux_timeout_secs: u64,
}

impl Default for Stitcher {
    fn default() -> Self {
        Self {
            crossfade: DEFAULT_OVERLAP_SECS,
            crf: 19,
            preset: "medium".to_string(),
            audio_bitrate: "192k".to_string(),
            encode_timeout_secs: 300,
            mux_timeout_secs: 120,
        }
    }
}

/// Temporary video-only output used between the two passes.
pub fn temp_video_path(output: impl AsRef<Path>) -> PathBuf {
    let output = output.as_ref();
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!("{}_temp_video.mp4", stem))
}

/// Sibling path the final pass writes to before it is renamed onto `output`.
///
/// The extension is kept so ffmpeg still picks the container from it.
pub fn partial_output_path(output: impl AsRef<Path>) -> PathBuf {
    let output = output.as_ref();
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let ext = output
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| "mp4".to_string());
    output.with_file_name(format!("{}.partial.{}", stem, ext))
}

impl Stitcher {
    pub fn with_crossfade(crossfade: f64) -> Self {
        Self {
            crossfade,
            ..Self::default()
        }
    }

    /// Copy the video stream and attach the original audio, trimmed to the
    /// shorter of the two.
    pub fn mux_command(
        &self,
        video: impl AsRef<Path>,
        audio: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> FfmpegCommand {
        FfmpegCommand::with_inputs([video.as_ref(), audio.as_ref()], output)
            .video_codec("copy")
            .audio_codec("aac")
            .audio_bitrate(self.audio_bitrate.clone())
            .map("0:v:0")
            .map("1:a:0")
            .shortest()
    }

    /// Encode the crossfaded video track of every segment, without audio.
    pub fn crossfade_command<P: AsRef<Path>>(
        &self,
        segments: &[P],
        durations: &[f64],
        output: impl AsRef<Path>,
    ) -> FfmpegCommand {
        FfmpegCommand::with_inputs(segments.iter().map(|p| p.as_ref()), output)
            .filter_complex(build_xfade_chain(durations, self.crossfade))
            .map("[vout]")
            .video_codec("libx264")
            .crf(self.crf)
            .preset(self.preset.clone())
            .pix_fmt("yuv420p")
    }

    /// Join `segments` in order and attach `original_audio`.
    ///
    /// Segments are never modified or removed, so a failed stitch can be
    /// retried on its own. `output` only appears once ffmpeg succeeded;
    /// an interrupted run leaves at most a `.partial` file behind.
    pub async fn stitch<P: AsRef<Path>>(
        &self,
        segments: &[P],
        original_audio: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> MediaResult<PathBuf> {
        let original_audio = original_audio.as_ref();
        let output = output.as_ref();

        if segments.is_empty() {
            return Err(MediaError::NoSegments);
        }
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial = partial_output_path(output);
        remove_if_exists(&partial).await?;

        if segments.len() == 1 {
            let cmd = self.mux_command(segments[0].as_ref(), original_audio, &partial);
            let result = FfmpegRunner::new()
                .with_timeout(self.mux_timeout_secs)
                .run(&cmd)
                .await;
            publish(result, &partial, output).await?;
            info!("Stitched (single clip): {}", output.display());
            return Ok(output.to_path_buf());
        }

        let mut durations = Vec::with_capacity(segments.len());
        for segment in segments {
            let duration = probe_duration(segment.as_ref()).await?;
            debug!(duration = duration, "Probed segment {}", segment.as_ref().display());
            durations.push(duration);
        }

        let temp_video = temp_video_path(output);
        let result = self
            .encode_and_mux(segments, &durations, &temp_video, original_audio, &partial)
            .await;

        if let Err(e) = remove_if_exists(&temp_video).await {
            warn!("Failed to remove {}: {}", temp_video.display(), e);
        }

        publish(result, &partial, output).await?;
        info!(
            clips = segments.len(),
            crossfade = self.crossfade,
            "Stitched: {}",
            output.display()
        );
        Ok(output.to_path_buf())
    }

    async fn encode_and_mux<P: AsRef<Path>>(
        &self,
        segments: &[P],
        durations: &[f64],
        temp_video: &Path,
        original_audio: &Path,
        output: &Path,
    ) -> MediaResult<()> {
        let total = crossfaded_duration(durations, self.crossfade);
        info!(
            "Stitching {} clips with {}s crossfade ({:.2}s timeline)",
            segments.len(),
            self.crossfade,
            total
        );

        let encode = self.crossfade_command(segments, durations, temp_video);
        FfmpegRunner::new()
            .with_timeout(self.encode_timeout_secs)
            .run_with_progress(&encode, move |p: FfmpegProgress| {
                debug!(
                    frame = p.frame,
                    speed = p.speed,
                    "Crossfade encode {:.0}%",
                    p.percentage(total)
                );
            })
            .await?;

        let mux = self.mux_command(temp_video, original_audio, output);
        FfmpegRunner::new()
            .with_timeout(self.mux_timeout_secs)
            .run(&mux)
            .await
    }
}

/// Rename a finished partial output into place, or discard it on failure.
async fn publish(result: MediaResult<()>, partial: &Path, output: &Path) -> MediaResult<()> {
    match result {
        Ok(()) => {
            tokio::fs::rename(partial, output).await?;
            Ok(())
        }
        Err(e) => {
            if let Err(cleanup) = remove_if_exists(partial).await {
                warn!("Failed to remove {}: {}", partial.display(), cleanup);
            }
            Err(e)
        }
    }
}

/// Stitch with default encoding settings and the given crossfade.
pub async fn stitch_segments<P: AsRef<Path>>(
    segment_paths: &[P],
    original_audio: impl AsRef<Path>,
    output: impl AsRef<Path>,
    crossfade: f64,
) -> MediaResult<PathBuf> {
    Stitcher::with_crossfade(crossfade)
        .stitch(segment_paths, original_audio, output)
        .await
}

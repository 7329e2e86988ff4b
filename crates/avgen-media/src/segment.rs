//! Audio window extraction.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// FFmpeg timeout for a single window cut.
const EXTRACT_TIMEOUT_SECS: u64 = 30;

/// Path of the `index`-th audio window cut from `source`.
///
/// Windows live next to the source in `<stem>_segments/<stem>_segNN.wav`.
pub fn audio_segment_path(source: impl AsRef<Path>, index: u32) -> PathBuf {
    let source = source.as_ref();
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "audio".to_string());
    let dir = source
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!("{}_segments", stem));
    dir.join(format!("{}_seg{:02}.wav", stem, index))
}

/// Build the command cutting `[start, start + duration)` out of `source`.
pub fn extract_command(
    source: impl AsRef<Path>,
    start: f64,
    duration: f64,
    output: impl AsRef<Path>,
) -> FfmpegCommand {
    FfmpegCommand::new(source, output)
        .seek(start)
        .duration(duration)
        .audio_codec("pcm_s16le")
}

/// Cut one window of `source` into a 16-bit PCM WAV file.
pub async fn extract_audio_segment(
    source: impl AsRef<Path>,
    start: f64,
    duration: f64,
    output: impl AsRef<Path>,
) -> MediaResult<PathBuf> {
    let output = output.as_ref();
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let cmd = extract_command(source.as_ref(), start, duration, output);
    FfmpegRunner::new()
        .with_timeout(EXTRACT_TIMEOUT_SECS)
        .run(&cmd)
        .await?;

    debug!(
        start = start,
        duration = duration,
        "Extracted audio window -> {}",
        output.display()
    );
    Ok(output.to_path_buf())
}

//! Stitching against a real ffmpeg. Skipped when ffmpeg, ffprobe or libx264
//! are not installed.

use std::path::{Path, PathBuf};

use avgen_media::filters::crossfaded_duration;
use avgen_media::stitch::partial_output_path;
use avgen_media::{check_ffmpeg, check_ffprobe, probe_duration, Stitcher};
use tempfile::TempDir;
use tokio::process::Command;

/// Container and codec padding allowed between expected and probed lengths.
const TOLERANCE_SECS: f64 = 0.25;

async fn ffmpeg_ready() -> bool {
    if check_ffmpeg().is_err() || check_ffprobe().is_err() {
        eprintln!("ffmpeg/ffprobe not found, skipping");
        return false;
    }
    let encoders = match Command::new("ffmpeg").args(["-hide_banner", "-encoders"]).output().await {
        Ok(out) => String::from_utf8_lossy(&out.stdout).to_string(),
        Err(_) => return false,
    };
    if !encoders.contains("libx264") {
        eprintln!("ffmpeg built without libx264, skipping");
        return false;
    }
    true
}

async fn lavfi(source: String, codec_args: &[&str], output: &Path) {
    let status = Command::new("ffmpeg")
        .args(["-y", "-v", "error", "-f", "lavfi", "-i", &source])
        .args(codec_args)
        .arg(output)
        .status()
        .await
        .unwrap();
    assert!(status.success(), "lavfi source {} failed", source);
}

async fn talking_clip(dir: &Path, name: &str, seconds: f64) -> PathBuf {
    let path = dir.join(name);
    lavfi(
        format!("testsrc=duration={}:size=64x64:rate=23", seconds),
        &["-c:v", "libx264", "-pix_fmt", "yuv420p"],
        &path,
    )
    .await;
    path
}

async fn narration(dir: &Path, seconds: f64) -> PathBuf {
    let path = dir.join("narration.wav");
    lavfi(
        format!("sine=frequency=440:sample_rate=16000:duration={}", seconds),
        &["-c:a", "pcm_s16le"],
        &path,
    )
    .await;
    path
}

#[tokio::test]
async fn test_crossfaded_output_follows_narration_length() {
    if !ffmpeg_ready().await {
        return;
    }
    let dir = TempDir::new().unwrap();
    let clips = vec![
        talking_clip(dir.path(), "job_seg00.mp4", 3.5).await,
        talking_clip(dir.path(), "job_seg01.mp4", 3.5).await,
        talking_clip(dir.path(), "job_seg02.mp4", 2.6).await,
    ];
    let stitcher = Stitcher::default();

    let mut durations = Vec::new();
    for clip in &clips {
        durations.push(probe_duration(clip).await.unwrap());
    }
    let timeline = crossfaded_duration(&durations, stitcher.crossfade);
    // Narration ends just before the video timeline, as planned windows do.
    let audio = narration(dir.path(), timeline - 0.4).await;
    let audio_len = probe_duration(&audio).await.unwrap();
    let output = dir.path().join("job.mp4");

    stitcher.stitch(&clips[..], &audio, &output).await.unwrap();

    let stitched = probe_duration(&output).await.unwrap();
    assert!(
        (stitched - audio_len).abs() < TOLERANCE_SECS,
        "output {:.3}s, narration {:.3}s, timeline {:.3}s",
        stitched,
        audio_len,
        timeline
    );
    assert!(!partial_output_path(&output).exists());
    for clip in &clips {
        assert!(clip.exists(), "segments are kept after stitching");
    }
}

#[tokio::test]
async fn test_crossfade_shortens_timeline_by_overlaps() {
    if !ffmpeg_ready().await {
        return;
    }
    let dir = TempDir::new().unwrap();
    let clips = vec![
        talking_clip(dir.path(), "job_seg00.mp4", 3.5).await,
        talking_clip(dir.path(), "job_seg01.mp4", 3.5).await,
    ];
    // Narration outlasts the video so the video timeline bounds the output.
    let audio = narration(dir.path(), 10.0).await;
    let output = dir.path().join("job.mp4");
    let stitcher = Stitcher::with_crossfade(0.5);

    stitcher.stitch(&clips[..], &audio, &output).await.unwrap();

    let first = probe_duration(&clips[0]).await.unwrap();
    let second = probe_duration(&clips[1]).await.unwrap();
    let stitched = probe_duration(&output).await.unwrap();
    assert!(
        (stitched - (first + second - 0.5)).abs() < TOLERANCE_SECS,
        "output {:.3}s from clips {:.3}s + {:.3}s",
        stitched,
        first,
        second
    );
}

#[tokio::test]
async fn test_single_clip_is_trimmed_to_narration() {
    if !ffmpeg_ready().await {
        return;
    }
    let dir = TempDir::new().unwrap();
    let clip = talking_clip(dir.path(), "job_seg00.mp4", 3.5).await;
    let audio = narration(dir.path(), 2.0).await;
    let output = dir.path().join("job.mp4");

    Stitcher::default().stitch(&[&clip], &audio, &output).await.unwrap();

    let stitched = probe_duration(&output).await.unwrap();
    assert!((stitched - 2.0).abs() < TOLERANCE_SECS, "output {:.3}s", stitched);
}

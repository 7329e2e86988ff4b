//! Filesystem helpers for generated artifacts.
//!
//! Downloads land in a staging directory that may sit on another
//! filesystem than the output tree, so moves fall back to copy + delete on
//! EXDEV.

use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Move a file from `src` to `dst`, handling cross-device moves.
///
/// Parent directories of `dst` are created. An existing `dst` is replaced.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            debug!(
                "Cross-device rename, falling back to copy+delete: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// EXDEV is error code 18 on Linux and macOS.
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    // Stage next to dst so the final rename stays on one filesystem.
    let tmp_dst = dst.with_extension("part");

    fs::copy(src, &tmp_dst).await?;

    if let Err(e) = fs::rename(&tmp_dst, dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src).await {
        warn!("Failed to remove {} after cross-device move: {}", src.display(), e);
    }

    Ok(())
}

/// Size of a regular file, `None` when it is missing or not a file.
pub async fn file_size(path: impl AsRef<Path>) -> Option<u64> {
    match fs::metadata(path.as_ref()).await {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    }
}

/// A file counts as produced only if it exists and exceeds `min_bytes`.
pub async fn is_produced(path: impl AsRef<Path>, min_bytes: u64) -> bool {
    file_size(path).await.is_some_and(|size| size > min_bytes)
}

/// Fail with [`MediaError::OutputTooSmall`] unless `path` was produced.
pub async fn verify_output(path: impl AsRef<Path>, min_bytes: u64) -> MediaResult<u64> {
    let path = path.as_ref();
    match file_size(path).await {
        Some(size) if size > min_bytes => Ok(size),
        Some(size) => Err(MediaError::OutputTooSmall {
            path: path.to_path_buf(),
            size,
            min: min_bytes,
        }),
        None => Err(MediaError::FileNotFound(path.to_path_buf())),
    }
}

/// Remove a file, ignoring a missing one.
pub async fn remove_if_exists(path: impl AsRef<Path>) -> MediaResult<()> {
    match fs::remove_file(path.as_ref()).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

//! Generation state persistence.
//!
//! [`StateStore`] has two primitives, `load` and `save`. Every mutation is a
//! read-modify-write through [`StateStore::update`], so each recorded
//! checkpoint is on disk before the caller moves on.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use avgen_models::{GenerationState, JobRecord};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{StateError, StateResult};

/// Persistence backend for [`GenerationState`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the current state. Never fails: missing or unreadable state is
    /// an empty state.
    async fn load(&self) -> GenerationState;

    /// Persist the whole state.
    async fn save(&self, state: &GenerationState) -> StateResult<()>;

    /// Load, apply `f`, and save. Nothing is written when `f` fails.
    async fn update<T, F>(&self, f: F) -> StateResult<T>
    where
        T: Send,
        F: FnOnce(&mut GenerationState) -> StateResult<T> + Send,
    {
        let mut state = self.load().await;
        let value = f(&mut state)?;
        self.save(&state).await?;
        Ok(value)
    }

    async fn record_run_started(&self) -> StateResult<()> {
        self.update(|state| {
            state.mark_run_started();
            Ok(())
        })
        .await
    }

    async fn record_job_started(&self, name: &str, job_type: &str, segments_total: u32) -> StateResult<()> {
        self.update(|state| {
            state.job_mut(name).start(job_type, segments_total);
            Ok(())
        })
        .await
    }

    /// Returns `true` if the index was not recorded before.
    async fn record_segment_complete(&self, name: &str, index: u32) -> StateResult<bool> {
        self.update(|state| {
            state
                .job_mut(name)
                .mark_segment_complete(index)
                .map_err(|e| StateError::record(name, e))
        })
        .await
    }

    async fn record_stitched(&self, name: &str, output_path: &Path) -> StateResult<()> {
        self.update(|state| {
            state
                .job_mut(name)
                .mark_stitched(output_path)
                .map_err(|e| StateError::record(name, e))
        })
        .await
    }

    async fn record_failed(&self, name: &str, reason: &str) -> StateResult<()> {
        self.update(|state| {
            state.job_mut(name).fail(reason);
            Ok(())
        })
        .await
    }

    async fn record_stitch_failed(&self, name: &str, reason: &str) -> StateResult<()> {
        self.update(|state| {
            state.job_mut(name).stitch_fail(reason);
            Ok(())
        })
        .await
    }

    /// Record a final output found on disk.
    async fn record_completed(&self, name: &str, output_path: &Path) -> StateResult<()> {
        self.update(|state| {
            state.job_mut(name).mark_completed(output_path);
            Ok(())
        })
        .await
    }
}

/// Reset records that break their invariants (a hand-edited file). Their
/// segments are re-verified on disk by the next reconcile.
fn sanitize(mut state: GenerationState) -> GenerationState {
    while let Err((job, e)) = state.check_invariants() {
        warn!(job = %job, "Discarding invalid job record: {}", e);
        state.jobs.insert(job, JobRecord::new());
    }
    state
}

/// Write `value` as pretty JSON to `path` via a temp file and rename.
pub(crate) async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> StateResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut json = serde_json::to_vec_pretty(value)?;
    json.push(b'\n');

    let tmp = temp_path(path);
    let mut file = tokio::fs::File::create(&tmp).await?;
    if let Err(e) = async {
        file.write_all(&json).await?;
        file.sync_all().await
    }
    .await
    {
        drop(file);
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    drop(file);

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// State kept in a single JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the state file, distinguishing a missing file (`Ok(None)`) from
    /// a corrupt one.
    pub async fn read(&self) -> StateResult<Option<GenerationState>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StateError::corrupt(&self.path, e.to_string()))
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self) -> GenerationState {
        match self.read().await {
            Ok(Some(state)) => sanitize(state),
            Ok(None) => {
                debug!(path = %self.path.display(), "No state file, starting fresh");
                GenerationState::empty()
            }
            Err(e) => {
                warn!("Could not load state, starting fresh: {}", e);
                GenerationState::empty()
            }
        }
    }

    async fn save(&self, state: &GenerationState) -> StateResult<()> {
        write_json_atomic(&self.path, state).await?;
        debug!(path = %self.path.display(), jobs = state.jobs.len(), "State saved");
        Ok(())
    }
}

/// In-process store, mainly for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<GenerationState>,
    saves: std::sync::atomic::AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: GenerationState) -> Self {
        Self {
            state: RwLock::new(state),
            saves: Default::default(),
        }
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Drop everything, as if the state file had been deleted.
    pub async fn clear(&self) {
        *self.state.write().await = GenerationState::empty();
        info!("Memory state cleared");
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> GenerationState {
        self.state.read().await.clone()
    }

    async fn save(&self, state: &GenerationState) -> StateResult<()> {
        *self.state.write().await = state.clone();
        self.saves.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avgen_models::{JobStatus, RecordError};

    use tempfile::TempDir;

    const JOB: &str = "v1_intro_avatar";

    fn file_store(dir: &TempDir) -> JsonFileStore {
        JsonFileStore::new(dir.path().join("state").join("generation_state.json"))
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = file_store(&dir);
        assert!(store.read().await.unwrap().is_none());
        assert_eq!(store.load().await, GenerationState::empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = file_store(&dir);
        tokio::fs::create_dir_all(store.path().parent().unwrap()).await.unwrap();
        tokio::fs::write(store.path(), b"{\"jobs\": {\"v1\": ").await.unwrap();

        assert!(matches!(store.read().await, Err(StateError::Corrupt { .. })));
        assert!(store.load().await.jobs.is_empty());

        // The next checkpoint replaces the corrupt document.
        store.record_job_started(JOB, "fantasytalking", 2).await.unwrap();
        assert_eq!(store.load().await.job(JOB).unwrap().segments_total, 2);
    }

    #[tokio::test]
    async fn test_checkpoints_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let store = file_store(&dir);
        store.record_run_started().await.unwrap();
        store.record_job_started(JOB, "fantasytalking", 3).await.unwrap();
        store.record_segment_complete(JOB, 0).await.unwrap();
        store.record_segment_complete(JOB, 1).await.unwrap();

        let reopened = file_store(&dir).load().await;
        assert!(reopened.last_run.is_some());
        let record = reopened.job(JOB).unwrap();
        assert_eq!(record.status, JobStatus::InProgress);
        assert_eq!(record.segments_completed.iter().copied().collect::<Vec<_>>(), vec![0, 1]);
        assert!(!dir.path().join("state").join("generation_state.json.tmp").exists());

        let raw = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert!(raw.contains("\n  \"jobs\""), "state file should be pretty-printed");
    }

    #[tokio::test]
    async fn test_invalid_record_is_reset_on_load() {
        let dir = TempDir::new().unwrap();
        let store = file_store(&dir);
        tokio::fs::create_dir_all(store.path().parent().unwrap()).await.unwrap();
        tokio::fs::write(
            store.path(),
            r#"{"jobs": {
                "bad": {"status": "completed", "segments_total": 2, "segments_completed": [0], "stitched": false},
                "good": {"status": "in_progress", "segments_total": 2, "segments_completed": [1]}
            }}"#,
        )
        .await
        .unwrap();

        let state = store.load().await;
        assert_eq!(state.job("bad").unwrap(), &JobRecord::new());
        assert_eq!(state.job("good").unwrap().completed_count(), 1);
    }

    #[tokio::test]
    async fn test_segment_complete_is_idempotent() {
        let store = MemoryStore::new();
        store.record_job_started(JOB, "fantasytalking", 3).await.unwrap();
        assert!(store.record_segment_complete(JOB, 2).await.unwrap());
        assert!(!store.record_segment_complete(JOB, 2).await.unwrap());
        assert_eq!(store.load().await.job(JOB).unwrap().completed_count(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_segment_is_rejected_without_write() {
        let store = MemoryStore::new();
        store.record_job_started(JOB, "fantasytalking", 2).await.unwrap();
        let saves = store.save_count();

        let err = store.record_segment_complete(JOB, 2).await.unwrap_err();
        assert!(matches!(
            err,
            StateError::Record {
                source: RecordError::SegmentOutOfRange { index: 2, total: 2 },
                ..
            }
        ));
        assert_eq!(store.save_count(), saves);
    }

    #[tokio::test]
    async fn test_stitched_requires_all_segments() {
        let store = MemoryStore::new();
        store.record_job_started(JOB, "fantasytalking", 2).await.unwrap();
        store.record_segment_complete(JOB, 0).await.unwrap();
        let out = Path::new("/out/v1_intro_avatar.mp4");

        assert!(store.record_stitched(JOB, out).await.is_err());

        store.record_segment_complete(JOB, 1).await.unwrap();
        store.record_stitched(JOB, out).await.unwrap();
        let state = store.load().await;
        let record = state.job(JOB).unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert!(record.stitched);
        assert_eq!(record.output_path.as_deref(), Some(out));
    }

    #[tokio::test]
    async fn test_stitch_failure_keeps_segments() {
        let store = MemoryStore::new();
        store.record_job_started(JOB, "fantasytalking", 1).await.unwrap();
        store.record_segment_complete(JOB, 0).await.unwrap();
        store.record_stitch_failed(JOB, "ffmpeg exited with 1").await.unwrap();

        let state = store.load().await;
        let record = state.job(JOB).unwrap();
        assert_eq!(record.status, JobStatus::StitchFailed);
        assert_eq!(record.completed_count(), 1);
        assert_eq!(record.last_error.as_deref(), Some("ffmpeg exited with 1"));
    }

    #[tokio::test]
    async fn test_memory_store_clear() {
        let store = MemoryStore::new();
        store.record_job_started(JOB, "fantasytalking", 3).await.unwrap();
        store.record_completed(JOB, Path::new("/out/a.mp4")).await.unwrap();
        assert_eq!(store.load().await.job(JOB).unwrap().completed_count(), 3);

        store.clear().await;
        assert!(store.load().await.jobs.is_empty());
    }
}

//! Per-file content tracking: backups, the four-stage change detector, and
//! content-changed event emission.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::backup::BackupStore;
use crate::debounce::BatchDebouncer;
use crate::diff::{DiffEngine, DiffResult};
use crate::error::FileMoleError;
use crate::event::ContentChangedEvent;
use crate::hash;
use crate::index::store::{IndexStore, TrackedFileRow};
use crate::index::writer::{IndexWriter, WriteMessage};
use crate::path_normalizer;

const MTIME_TOLERANCE: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub enum TrackingError {
    Backup(crate::backup::BackupError),
    Hash(hash::HashError),
    Store(crate::index::store::IndexStoreError),
    Diff(crate::diff::DiffError),
    Io(std::io::Error),
}

impl std::fmt::Display for TrackingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backup(e) => write!(f, "{e}"),
            Self::Hash(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "{e}"),
            Self::Diff(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for TrackingError {}

impl From<crate::backup::BackupError> for TrackingError {
    fn from(e: crate::backup::BackupError) -> Self {
        Self::Backup(e)
    }
}
impl From<hash::HashError> for TrackingError {
    fn from(e: hash::HashError) -> Self {
        Self::Hash(e)
    }
}
impl From<crate::index::store::IndexStoreError> for TrackingError {
    fn from(e: crate::index::store::IndexStoreError) -> Self {
        Self::Store(e)
    }
}
impl From<crate::diff::DiffError> for TrackingError {
    fn from(e: crate::diff::DiffError) -> Self {
        Self::Diff(e)
    }
}
impl From<std::io::Error> for TrackingError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[derive(Debug, Clone)]
struct TrackedState {
    enabled_at: String,
    last_hash: Option<String>,
}

pub struct TrackingManager {
    backup: BackupStore,
    store: IndexStore,
    writer: IndexWriter,
    tracking_ignore_file_name: String,
    tracked: DashMap<PathBuf, TrackedState>,
    events: broadcast::Sender<ContentChangedEvent>,
    /// Batches raw content-change notifications for the same path — keyed by
    /// path, valued by the mole root needed to re-derive the backup location
    /// — and flushes them through `handle_changed` once `content_batch_window`
    /// elapses with no further notifications.
    content_batch: BatchDebouncer<PathBuf, PathBuf>,
}

impl TrackingManager {
    /// Must be called from within a tokio runtime context (the content-change
    /// batch debouncer spawns its flush timer on it).
    pub fn new(
        backup: BackupStore,
        store: IndexStore,
        writer: IndexWriter,
        tracking_ignore_file_name: impl Into<String>,
        content_batch_window: Duration,
    ) -> Self {
        let (events, _rx) = broadcast::channel(256);
        Self {
            backup,
            store,
            writer,
            tracking_ignore_file_name: tracking_ignore_file_name.into(),
            tracked: DashMap::new(),
            events,
            content_batch: BatchDebouncer::new(content_batch_window),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ContentChangedEvent> {
        self.events.subscribe()
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.tracked.contains_key(&path_normalizer::canonicalize(path))
    }

    /// Accumulates a raw content-change notification for `path`; once
    /// `content_batch_window` elapses with no further notification for any
    /// path in the batch, every accumulated path is run through
    /// `handle_changed` off the calling thread.
    pub async fn submit_changed(self: &Arc<Self>, mole_root: &Path, path: &Path) {
        let canonical = path_normalizer::canonicalize(path);
        let mole_root = mole_root.to_path_buf();
        let manager = Arc::clone(self);

        self.content_batch
            .submit(canonical, mole_root, move |drained| {
                let manager = Arc::clone(&manager);
                async move {
                    for (path, mole_root) in drained {
                        let manager = Arc::clone(&manager);
                        let result = tokio::task::spawn_blocking(move || manager.handle_changed(&mole_root, &path)).await;
                        match result {
                            Ok(Err(err)) => log::error!("tracked content-change handling failed: {err}"),
                            Err(join_err) => log::error!("tracked content-change task panicked: {join_err}"),
                            Ok(Ok(())) => {}
                        }
                    }
                }
            })
            .await;
    }

    /// At startup: load every persisted `TrackedFile` row, then reconcile —
    /// drop rows whose source has vanished, and back up any enabled row
    /// that is missing its blob.
    pub fn initialize(&self, mole_root: &Path) -> Result<(), FileMoleError> {
        self.initialize_inner(mole_root).map_err(FileMoleError::from)
    }

    fn initialize_inner(&self, mole_root: &Path) -> Result<(), TrackingError> {
        for row in self.store.list_tracked_files()? {
            let path = PathBuf::from(&row.full_path);
            if !path.is_file() {
                self.writer.send(WriteMessage::DeleteTrackedFile(row.full_path.clone()));
                continue;
            }

            if !self.backup.has_backup(mole_root, &path)? {
                self.backup.backup(mole_root, &path)?;
            }

            self.tracked.insert(
                path_normalizer::canonicalize(&path),
                TrackedState {
                    enabled_at: row.enabled_at,
                    last_hash: row.last_hash,
                },
            );
        }
        Ok(())
    }

    /// Ensures the sidecar exists, adds an include rule, persists the row,
    /// takes the initial backup, and emits an `initial` content-changed
    /// event carrying the full content as an "inserted" diff against the
    /// not-yet-existing backup.
    pub fn enable(&self, mole_root: &Path, path: &Path) -> Result<(), FileMoleError> {
        self.enable_inner(mole_root, path).map_err(FileMoleError::from)
    }

    fn enable_inner(&self, mole_root: &Path, path: &Path) -> Result<(), TrackingError> {
        let canonical = path_normalizer::canonicalize(path);
        let backup_path = self.backup.backup_path(mole_root, &canonical)?;

        self.add_include_rule(mole_root, &canonical)?;

        let enabled_at = Utc::now().to_rfc3339();
        self.writer.send(WriteMessage::UpsertTrackedFile(TrackedFileRow {
            full_path: canonical.to_string_lossy().replace('\\', "/"),
            enabled_at: enabled_at.clone(),
            last_hash: None,
        }));

        let diff = DiffEngine::generate(&backup_path, &canonical, true)?;
        self.backup.backup(mole_root, &canonical)?;
        let last_hash = hash::full_hash(&canonical).ok();

        self.writer.send(WriteMessage::UpsertTrackedFile(TrackedFileRow {
            full_path: canonical.to_string_lossy().replace('\\', "/"),
            enabled_at: enabled_at.clone(),
            last_hash: last_hash.clone(),
        }));

        self.tracked.insert(canonical.clone(), TrackedState { enabled_at, last_hash });
        let _ = self.events.send(ContentChangedEvent::new(canonical, diff));
        Ok(())
    }

    pub fn disable(&self, mole_root: &Path, path: &Path) -> Result<(), FileMoleError> {
        self.disable_inner(mole_root, path).map_err(FileMoleError::from)
    }

    fn disable_inner(&self, mole_root: &Path, path: &Path) -> Result<(), TrackingError> {
        let canonical = path_normalizer::canonicalize(path);
        self.tracked.remove(&canonical);
        self.writer.send(WriteMessage::DeleteTrackedFile(canonical.to_string_lossy().replace('\\', "/")));
        self.backup.delete_backup(mole_root, &canonical)?;
        Ok(())
    }

    /// Runs the four-stage change detector against the backup baseline;
    /// only on a positive result does this produce a diff, emit an event,
    /// and refresh the backup.
    pub fn handle_changed(&self, mole_root: &Path, path: &Path) -> Result<(), FileMoleError> {
        self.handle_changed_inner(mole_root, path).map_err(FileMoleError::from)
    }

    fn handle_changed_inner(&self, mole_root: &Path, path: &Path) -> Result<(), TrackingError> {
        let canonical = path_normalizer::canonicalize(path);
        if !self.tracked.contains_key(&canonical) {
            return Ok(());
        }

        let backup_path = self.backup.backup_path(mole_root, &canonical)?;
        if !backup_path.is_file() {
            self.backup.backup(mole_root, &canonical)?;
            return Ok(());
        }

        if !detect_changed(&backup_path, &canonical)? {
            return Ok(());
        }

        let diff = DiffEngine::generate(&backup_path, &canonical, false)?;
        self.backup.backup(mole_root, &canonical)?;
        let last_hash = hash::full_hash(&canonical).ok();

        if let Some(mut state) = self.tracked.get_mut(&canonical) {
            state.last_hash = last_hash.clone();
        }
        self.writer.send(WriteMessage::UpsertTrackedFile(TrackedFileRow {
            full_path: canonical.to_string_lossy().replace('\\', "/"),
            enabled_at: self.tracked.get(&canonical).map(|s| s.enabled_at.clone()).unwrap_or_default(),
            last_hash,
        }));

        let _ = self.events.send(ContentChangedEvent::new(canonical, diff));
        Ok(())
    }

    pub fn handle_deleted(&self, mole_root: &Path, path: &Path) -> Result<(), FileMoleError> {
        self.handle_deleted_inner(mole_root, path).map_err(FileMoleError::from)
    }

    fn handle_deleted_inner(&self, mole_root: &Path, path: &Path) -> Result<(), TrackingError> {
        let canonical = path_normalizer::canonicalize(path);
        if self.tracked.remove(&canonical).is_some() {
            self.writer.send(WriteMessage::DeleteTrackedFile(canonical.to_string_lossy().replace('\\', "/")));
            self.backup.delete_backup(mole_root, &canonical)?;
        }
        Ok(())
    }

    fn add_include_rule(&self, mole_root: &Path, path: &Path) -> Result<(), TrackingError> {
        let sidecar = self.backup.sidecar_dir_for(mole_root, path)?;
        let ignore_path = sidecar.join(&self.tracking_ignore_file_name);
        let relative = path_normalizer::relative(mole_root, path).unwrap_or_else(|| path.to_path_buf());
        let rule = format!("!{}\n", relative.to_string_lossy());

        let mut contents = std::fs::read_to_string(&ignore_path).unwrap_or_default();
        if !contents.contains(rule.trim_end()) {
            contents.push_str(&rule);
            std::fs::write(&ignore_path, contents)?;
        }
        Ok(())
    }
}

/// Stage (a)-(d): mtime tolerance, size, partial hash, full byte compare.
/// The first positive answer decides "changed".
fn detect_changed(backup_path: &Path, source_path: &Path) -> Result<bool, TrackingError> {
    let backup_meta = std::fs::metadata(backup_path)?;
    let source_meta = std::fs::metadata(source_path)?;

    if mtime_differs_beyond_tolerance(&backup_meta, &source_meta) {
        return Ok(true);
    }
    if backup_meta.len() != source_meta.len() {
        return Ok(true);
    }
    if hash::partial_hash(backup_path)? != hash::partial_hash(source_path)? {
        return Ok(true);
    }
    Ok(!files_byte_equal(backup_path, source_path)?)
}

fn mtime_differs_beyond_tolerance(a: &std::fs::Metadata, b: &std::fs::Metadata) -> bool {
    let (Ok(a_mtime), Ok(b_mtime)) = (a.modified(), b.modified()) else {
        return false;
    };
    let diff = a_mtime
        .duration_since(b_mtime)
        .unwrap_or_else(|e| e.duration());
    diff > MTIME_TOLERANCE
}

fn files_byte_equal(a: &Path, b: &Path) -> Result<bool, std::io::Error> {
    let mut fa = std::fs::File::open(a)?;
    let mut fb = std::fs::File::open(b)?;
    let mut buf_a = [0u8; 64 * 1024];
    let mut buf_b = [0u8; 64 * 1024];
    loop {
        let na = fa.read(&mut buf_a)?;
        let nb = fb.read(&mut buf_b)?;
        if na != nb {
            return Ok(false);
        }
        if na == 0 {
            return Ok(true);
        }
        if buf_a[..na] != buf_b[..nb] {
            return Ok(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(dir: &std::path::Path) -> (TrackingManager, PathBuf) {
        let db_path = dir.join("index.db");
        let store = IndexStore::open(&db_path).unwrap();
        let writer = IndexWriter::spawn(db_path).unwrap();
        let backup = BackupStore::new(".hill");
        (
            TrackingManager::new(backup, store, writer, ".tracking-ignore", Duration::from_secs(60)),
            dir.to_path_buf(),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enable_creates_backup_and_marks_tracked() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"hello\nworld").unwrap();

        let (manager, root) = setup(dir.path());
        manager.enable(&root, &file).unwrap();

        assert!(manager.is_tracked(&file));
        let backup = BackupStore::new(".hill");
        assert!(backup.has_backup(&root, &file).unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enable_emits_initial_content_changed_event() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"hello\nworld").unwrap();

        let (manager, root) = setup(dir.path());
        let mut rx = manager.subscribe();
        manager.enable(&root, &file).unwrap();

        let event = rx.try_recv().unwrap();
        match event.diff {
            DiffResult::Text { is_initial, .. } => assert!(is_initial),
            other => panic!("expected Text diff, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unchanged_file_produces_no_content_changed_event() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"hello\nworld").unwrap();

        let (manager, root) = setup(dir.path());
        let mut rx = manager.subscribe();
        manager.enable(&root, &file).unwrap();
        let _ = rx.try_recv().unwrap();

        manager.handle_changed(&root, &file).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn content_change_produces_text_diff_event() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"hello\nworld").unwrap();

        let (manager, root) = setup(dir.path());
        let mut rx = manager.subscribe();
        manager.enable(&root, &file).unwrap();
        let _ = rx.try_recv().unwrap();

        std::thread::sleep(Duration::from_millis(1100));
        std::fs::write(&file, b"hello\nthere").unwrap();
        manager.handle_changed(&root, &file).unwrap();

        let event = rx.try_recv().unwrap();
        match event.diff {
            DiffResult::Text { is_changed, .. } => assert!(is_changed),
            other => panic!("expected Text diff, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disable_removes_tracked_state_and_backup() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"hello").unwrap();

        let (manager, root) = setup(dir.path());
        manager.enable(&root, &file).unwrap();
        manager.disable(&root, &file).unwrap();

        assert!(!manager.is_tracked(&file));
        let backup = BackupStore::new(".hill");
        assert!(!backup.has_backup(&root, &file).unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deleted_source_removes_tracked_state() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"hello").unwrap();

        let (manager, root) = setup(dir.path());
        manager.enable(&root, &file).unwrap();
        std::fs::remove_file(&file).unwrap();
        manager.handle_deleted(&root, &file).unwrap();

        assert!(!manager.is_tracked(&file));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn submit_changed_batches_and_eventually_runs_handle_changed() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "hello\nworld").unwrap();

        let db_path = dir.path().join("index.db");
        let store = IndexStore::open(&db_path).unwrap();
        let writer = IndexWriter::spawn(db_path).unwrap();
        let backup = BackupStore::new(".hill");
        let manager = Arc::new(TrackingManager::new(
            backup,
            store,
            writer,
            ".tracking-ignore",
            Duration::from_millis(30),
        ));

        let mut rx = manager.subscribe();
        manager.enable(dir.path(), &file).unwrap();
        let _initial = rx.try_recv().unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;
        std::fs::write(&file, "hello\nthere").unwrap();
        manager.submit_changed(dir.path(), &file).await;

        assert!(rx.try_recv().is_err(), "the batch window has not elapsed yet");

        tokio::time::sleep(Duration::from_millis(150)).await;
        let event = rx.try_recv().expect("batched content-change eventually flushes");
        match event.diff {
            DiffResult::Text { is_changed, .. } => assert!(is_changed),
            other => panic!("expected Text diff, got {other:?}"),
        }
    }
}

//! Initial recursive reconciliation sweep over one or more mole roots.
//!
//! Walks each root concurrently, batching entries into the index writer,
//! then — once every root has finished — deletes rows whose `last_scanned`
//! predates the sweep start, which is how deletions that happened while the
//! library was not running get reconciled.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::index::store::IndexEntry;
use crate::index::writer::{IndexWriter, WriteMessage};
use crate::ignore_engine::IgnoreEngine;

#[derive(Debug)]
pub enum ScanError {
    Cancelled,
    Io(std::io::Error),
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "scan cancelled"),
            Self::Io(e) => write!(f, "scan I/O error: {e}"),
        }
    }
}

impl std::error::Error for ScanError {}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

pub struct Scanner {
    writer: Arc<IndexWriter>,
    ignore_engine: Arc<IgnoreEngine>,
    batch_size: usize,
    /// jwalk's rayon thread pool size for the walk; 0 lets jwalk pick based
    /// on available parallelism.
    num_threads: usize,
}

impl Scanner {
    pub fn new(writer: Arc<IndexWriter>, ignore_engine: Arc<IgnoreEngine>, batch_size: usize) -> Self {
        Self { writer, ignore_engine, batch_size, num_threads: 0 }
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Scans every root concurrently, then runs the post-scan reconciliation
    /// sweep. Returns the ISO-8601 `scan_start` timestamp used for that
    /// sweep so callers can assert on it in tests.
    pub async fn scan_roots(&self, roots: &[PathBuf], cancel: CancellationToken) -> Result<String, ScanError> {
        let scan_start = Utc::now().to_rfc3339();

        let mut handles = Vec::new();
        for root in roots {
            let root = root.clone();
            let writer = Arc::clone(&self.writer);
            let ignore_engine = Arc::clone(&self.ignore_engine);
            let cancel = cancel.clone();
            let batch_size = self.batch_size;

            let num_threads = self.num_threads;
            handles.push(tokio::task::spawn_blocking(move || {
                scan_one_root(&root, &writer, &ignore_engine, batch_size, num_threads, &cancel)
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => return Err(err),
                Err(_join_err) => return Err(ScanError::Cancelled),
            }
        }

        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        self.writer.flush();
        self.writer.send(WriteMessage::DeleteOlderThan(scan_start.clone()));
        self.writer.flush();

        Ok(scan_start)
    }
}

fn scan_one_root(
    root: &Path,
    writer: &IndexWriter,
    ignore_engine: &IgnoreEngine,
    batch_size: usize,
    num_threads: usize,
    cancel: &CancellationToken,
) -> Result<(), ScanError> {
    let mut batch = Vec::with_capacity(batch_size);

    let walker = jwalk::WalkDir::new(root).parallelism(jwalk::Parallelism::RayonNewPool(num_threads));

    for entry in walker.into_iter() {
        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                log::warn!("scan error under {}: {err}", root.display());
                continue;
            }
        };

        let path = entry.path();
        if ignore_engine.should_ignore(&path) {
            continue;
        }

        let Ok(file_type) = entry.file_type() else { continue };
        if file_type.is_dir() {
            continue;
        }

        if let Some(index_entry) = build_entry(&path) {
            batch.push(index_entry);
        }

        if batch.len() >= batch_size {
            writer.send(WriteMessage::UpsertBatch(std::mem::take(&mut batch)));
        }
    }

    if !batch.is_empty() {
        writer.send(WriteMessage::UpsertBatch(batch));
    }

    Ok(())
}

fn build_entry(path: &Path) -> Option<IndexEntry> {
    let meta = std::fs::metadata(path).ok()?;
    let directory = path.parent()?.to_string_lossy().replace('\\', "/");
    let name = path.file_name()?.to_string_lossy().into_owned();

    let created = meta.created().or_else(|_| meta.modified()).ok()?;
    let modified = meta.modified().ok()?;

    Some(IndexEntry {
        directory,
        name,
        size: meta.len(),
        created: DateTime::<Utc>::from(created).to_rfc3339(),
        modified: DateTime::<Utc>::from(modified).to_rfc3339(),
        attributes: if meta.permissions().readonly() { 0x1 } else { 0 },
        last_scanned: String::new(),
    })
}

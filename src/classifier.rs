//! Decides whether a raw filesystem event represents a real change worth
//! indexing and publishing, then performs the single index mutation for it.
//!
//! The Classifier never touches the database directly: every mutation goes
//! through the [`crate::index::writer::IndexWriter`] channel, and every read
//! goes through [`crate::index::store::IndexStore`].

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::event::{Event, EventKind};
use crate::index::store::{IndexEntry, IndexStore, IndexStoreError};
use crate::index::writer::{IndexWriter, WriteMessage};

const ATTR_READONLY: u32 = 0x1;
const ATTR_DIRECTORY: u32 = 0x10;

/// Converts filesystem metadata into an `IndexEntry` keyed at `(directory,
/// name)`, computed fresh from disk for every classification.
fn current_entry(path: &Path) -> Option<IndexEntry> {
    let meta = std::fs::metadata(path).ok()?;
    let directory = path.parent()?.to_string_lossy().replace('\\', "/");
    let name = path.file_name()?.to_string_lossy().into_owned();

    let created = meta
        .created()
        .or_else(|_| meta.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);

    let mut attributes = 0u32;
    if meta.permissions().readonly() {
        attributes |= ATTR_READONLY;
    }
    if meta.is_dir() {
        attributes |= ATTR_DIRECTORY;
    }

    Some(IndexEntry {
        directory,
        name,
        size: meta.len(),
        created: DateTime::<Utc>::from(created).to_rfc3339(),
        modified: DateTime::<Utc>::from(modified).to_rfc3339(),
        attributes,
        last_scanned: String::new(), // stamped by the writer on upsert
    })
}

/// True iff `observed` differs from `stored` in any attribute the index
/// tracks. A missing `stored` row counts as changed.
fn has_changed(stored: Option<&IndexEntry>, observed: &IndexEntry) -> bool {
    match stored {
        None => true,
        Some(stored) => {
            stored.size != observed.size
                || stored.created != observed.created
                || stored.modified != observed.modified
                || stored.attributes != observed.attributes
        }
    }
}

pub struct Classifier {
    store: IndexStore,
    writer: IndexWriter,
    events: broadcast::Sender<Event>,
}

impl Classifier {
    pub fn new(store: IndexStore, writer: IndexWriter, events: broadcast::Sender<Event>) -> Self {
        Self { store, writer, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Blocks until every index mutation sent so far has been applied.
    /// Tests use this to observe a deterministic post-write state; the live
    /// pipeline does not need it since reads tolerate eventual consistency.
    pub fn flush(&self) {
        self.writer.flush();
    }

    /// Created events always emit and upsert, skipping the change check.
    pub fn on_created(&self, path: PathBuf, is_directory: bool) {
        if let Some(entry) = current_entry(&path) {
            self.writer.send(WriteMessage::Upsert(entry));
        }
        self.publish(Event::new(EventKind::Created, path, is_directory));
    }

    /// Only emits and upserts when the observed metadata differs from the
    /// stored row.
    pub fn on_changed(&self, path: PathBuf, is_directory: bool) -> Result<(), IndexStoreError> {
        let Some(observed) = current_entry(&path) else {
            return Ok(());
        };
        let stored = self.store.get(&observed.directory, &observed.name)?;

        if has_changed(stored.as_ref(), &observed) {
            self.writer.send(WriteMessage::Upsert(observed));
            self.publish(Event::new(EventKind::Changed, path, is_directory));
        }
        Ok(())
    }

    /// Directory deletes drop every row under the prefix; file deletes drop
    /// the single row.
    pub fn on_deleted(&self, path: PathBuf, is_directory: bool) {
        let normalized = path.to_string_lossy().replace('\\', "/");
        if is_directory {
            self.writer.send(WriteMessage::DeleteByDirectoryPrefix(normalized));
        } else {
            self.writer.send(WriteMessage::DeleteByPath(normalized));
        }
        self.publish(Event::new(EventKind::Deleted, path, is_directory));
    }

    /// Deletes the old row, then upserts the new one if the destination
    /// still exists (a vanished destination degrades to a delete).
    pub fn on_renamed(&self, old_path: PathBuf, new_path: PathBuf, is_directory: bool) {
        let old_normalized = old_path.to_string_lossy().replace('\\', "/");
        self.writer.send(WriteMessage::DeleteByPath(old_normalized.clone()));

        if is_directory {
            self.writer.send(WriteMessage::RenameDirectoryPrefix {
                old_dir: old_normalized,
                new_dir: new_path.to_string_lossy().replace('\\', "/"),
            });
        } else if let Some(entry) = current_entry(&new_path) {
            self.writer.send(WriteMessage::Upsert(entry));
        } else {
            self.publish(Event::new(EventKind::Deleted, old_path, is_directory));
            return;
        }

        self.publish(Event::renamed(old_path, new_path, is_directory));
    }

    fn publish(&self, event: Event) {
        // No active subscribers is not an error; the facade may not have
        // attached a listener yet.
        let _ = self.events.send(event);
    }
}

//! Single-writer thread for the index database.
//!
//! SQLite allows only one writer at a time; rather than contend a mutex on
//! every mutation, every write funnels through one dedicated thread via an
//! mpsc channel. Readers keep using their own connections against the WAL
//! file independently (see [`super::store::IndexStore`]).

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use super::store::{IndexEntry, IndexStore, TrackedFileRow};

pub enum WriteMessage {
    Upsert(IndexEntry),
    UpsertBatch(Vec<IndexEntry>),
    DeleteByPath(String),
    DeleteByDirectoryPrefix(String),
    DeleteOlderThan(String),
    RenameDirectoryPrefix { old_dir: String, new_dir: String },
    UpsertTrackedFile(TrackedFileRow),
    DeleteTrackedFile(String),
    /// Blocks the caller until every message enqueued before it has been
    /// applied. Used by the scanner to guarantee all per-root batches have
    /// landed before it runs the `delete_older_than` reconciliation sweep.
    Flush(mpsc::Sender<()>),
    Shutdown,
}

/// Handle to the writer thread. Cloning the sender is the normal way to
/// hand write access to the watcher, classifier, tracking manager, and
/// scanner without sharing a connection.
pub struct IndexWriter {
    sender: Sender<WriteMessage>,
    handle: Option<JoinHandle<()>>,
}

impl IndexWriter {
    pub fn spawn(db_path: PathBuf) -> Result<Self, super::store::IndexStoreError> {
        // Open eagerly so a misconfigured path fails the caller immediately
        // instead of silently inside the background thread.
        let conn = IndexStore::open_write_connection(&db_path)?;
        let (sender, receiver) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("filemole-index-writer".into())
            .spawn(move || run(conn, receiver))
            .expect("failed to spawn index writer thread");

        Ok(Self {
            sender,
            handle: Some(handle),
        })
    }

    pub fn sender(&self) -> Sender<WriteMessage> {
        self.sender.clone()
    }

    pub fn send(&self, message: WriteMessage) {
        if self.sender.send(message).is_err() {
            log::error!("index writer thread is gone; dropping write");
        }
    }

    /// Blocks until every previously-sent message has been applied.
    pub fn flush(&self) {
        let (tx, rx) = mpsc::channel();
        self.send(WriteMessage::Flush(tx));
        let _ = rx.recv();
    }

    pub fn shutdown(mut self) {
        self.send(WriteMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for IndexWriter {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.sender.send(WriteMessage::Shutdown);
            let _ = handle.join();
        }
    }
}

fn run(mut conn: rusqlite::Connection, receiver: Receiver<WriteMessage>) {
    for message in receiver.iter() {
        let is_shutdown = matches!(message, WriteMessage::Shutdown);
        if let Err(err) = apply(&mut conn, message) {
            log::error!("index write failed: {err}");
        }
        if is_shutdown {
            break;
        }
    }
}

fn apply(conn: &mut rusqlite::Connection, message: WriteMessage) -> Result<(), super::store::IndexStoreError> {
    match message {
        WriteMessage::Upsert(entry) => IndexStore::upsert(conn, &entry),
        WriteMessage::UpsertBatch(entries) => IndexStore::upsert_batch(conn, &entries),
        WriteMessage::DeleteByPath(path) => IndexStore::delete_by_path(conn, &path),
        WriteMessage::DeleteByDirectoryPrefix(dir) => IndexStore::delete_by_directory_prefix(conn, &dir).map(|_| ()),
        WriteMessage::DeleteOlderThan(cutoff) => IndexStore::delete_older_than(conn, &cutoff).map(|_| ()),
        WriteMessage::RenameDirectoryPrefix { old_dir, new_dir } => {
            IndexStore::rename_directory_prefix(conn, &old_dir, &new_dir).map(|_| ())
        }
        WriteMessage::UpsertTrackedFile(row) => IndexStore::upsert_tracked_file(conn, &row),
        WriteMessage::DeleteTrackedFile(path) => IndexStore::delete_tracked_file(conn, &path),
        WriteMessage::Flush(ack) => {
            let _ = ack.send(());
            Ok(())
        }
        WriteMessage::Shutdown => Ok(()),
    }
}

//! The SQLite-backed file index: schema, CRUD, and a single-writer thread.

pub mod store;
pub mod writer;

pub use store::{IndexEntry, IndexStore, IndexStoreError, TrackedFileRow};
pub use writer::{IndexWriter, WriteMessage};

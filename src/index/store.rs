//! SQLite-backed metadata index.
//!
//! One embedded database backs the whole library instance (default location:
//! `<data_path>/filemole.db`). Uses WAL mode so reads never block behind the
//! single writer thread (see [`super::writer`]). This module owns the schema,
//! read queries, and the static write helpers the writer thread calls.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};

// ── Types ────────────────────────────────────────────────────────────

/// A single row of the file index: `(directory, name) -> metadata`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Canonical directory path, never trailing-separator-terminated (except
    /// the filesystem root).
    pub directory: String,
    pub name: String,
    pub size: u64,
    /// ISO-8601 creation timestamp.
    pub created: String,
    /// ISO-8601 modification timestamp.
    pub modified: String,
    pub attributes: u32,
    /// ISO-8601 timestamp of the upsert that produced this row. Advances
    /// monotonically on every upsert of the same key.
    pub last_scanned: String,
}

impl IndexEntry {
    pub fn full_path(&self) -> PathBuf {
        Path::new(&self.directory).join(&self.name)
    }
}

/// A `TrackingFile` row: tracked-file metadata persisted alongside the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFileRow {
    pub full_path: String,
    /// ISO-8601 timestamp of when tracking was enabled.
    pub enabled_at: String,
    pub last_hash: Option<String>,
}

// ── Errors ───────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum IndexStoreError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
}

impl From<rusqlite::Error> for IndexStoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sqlite(err)
    }
}

impl From<std::io::Error> for IndexStoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl std::fmt::Display for IndexStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(e) => write!(f, "SQLite error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for IndexStoreError {}

// ── Schema ───────────────────────────────────────────────────────────

const CREATE_TABLES_SQL: &str = "
    CREATE TABLE IF NOT EXISTS FileIndex(
        Directory   TEXT NOT NULL,
        Name        TEXT NOT NULL,
        Size        INTEGER NOT NULL,
        Created     TEXT NOT NULL,
        Modified    TEXT NOT NULL,
        Attributes  INTEGER NOT NULL,
        LastScanned TEXT NOT NULL,
        PRIMARY KEY (Directory, Name)
    );

    CREATE INDEX IF NOT EXISTS idx_FileIndex_Directory_Name ON FileIndex(Directory, Name);
    CREATE INDEX IF NOT EXISTS idx_FileIndex_Name ON FileIndex(Name);

    CREATE TABLE IF NOT EXISTS TrackingFile(
        FullPath  TEXT PRIMARY KEY,
        EnabledAt TEXT NOT NULL,
        LastHash  TEXT NULL
    );
";

fn apply_pragmas(conn: &Connection) -> Result<(), IndexStoreError> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;",
    )?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), IndexStoreError> {
    conn.execute_batch(CREATE_TABLES_SQL)?;
    Ok(())
}

/// Current timestamp, ISO-8601.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

// ── IndexStore ───────────────────────────────────────────────────────

/// Read-oriented handle to the index database.
///
/// Holds a single read connection (WAL allows concurrent reads from any
/// thread); writes go through a separate connection owned by the
/// [`super::writer::IndexWriter`] thread.
pub struct IndexStore {
    db_path: PathBuf,
    read_conn: Connection,
}

impl IndexStore {
    /// Open (or create) the index database at `db_path`, creating parent
    /// directories as needed ("ReadWriteCreate" open semantics).
    pub fn open(db_path: &Path) -> Result<Self, IndexStoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        apply_pragmas(&conn)?;
        create_tables(&conn)?;
        Ok(Self {
            db_path: db_path.to_path_buf(),
            read_conn: conn,
        })
    }

    /// Open a separate write connection with the same pragmas, for the
    /// writer thread.
    pub fn open_write_connection(db_path: &Path) -> Result<Connection, IndexStoreError> {
        let conn = Connection::open(db_path)?;
        apply_pragmas(&conn)?;
        Ok(conn)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ── Read methods ─────────────────────────────────────────────────

    pub fn get(&self, directory: &str, name: &str) -> Result<Option<IndexEntry>, IndexStoreError> {
        Self::get_on(&self.read_conn, directory, name)
    }

    fn get_on(conn: &Connection, directory: &str, name: &str) -> Result<Option<IndexEntry>, IndexStoreError> {
        let mut stmt = conn.prepare_cached(
            "SELECT Directory, Name, Size, Created, Modified, Attributes, LastScanned
             FROM FileIndex WHERE Directory = ?1 AND Name = ?2",
        )?;
        stmt.query_row(params![directory, name], row_to_entry).optional().map_err(Into::into)
    }

    /// Case-insensitive substring search over `directory || '/' || name`.
    pub fn search(&self, term: &str) -> Result<Vec<IndexEntry>, IndexStoreError> {
        let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
        let mut stmt = self.read_conn.prepare(
            "SELECT Directory, Name, Size, Created, Modified, Attributes, LastScanned
             FROM FileIndex
             WHERE lower(Directory || '/' || Name) LIKE ?1 ESCAPE '\\'",
        )?;
        let rows = stmt.query_map(params![pattern], row_to_entry)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn count_under(&self, prefix: &str) -> Result<u64, IndexStoreError> {
        let like_pattern = format!("{}/%", prefix);
        let count: u64 = self.read_conn.query_row(
            "SELECT COUNT(*) FROM FileIndex WHERE Directory = ?1 OR Directory LIKE ?2",
            params![prefix, like_pattern],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ── Static write helpers (for the writer thread) ──────────────────

    /// Upsert a single entry, stamping `LastScanned = now()`.
    pub fn upsert(conn: &Connection, entry: &IndexEntry) -> Result<(), IndexStoreError> {
        let stamped = now_iso();
        conn.execute(
            "INSERT INTO FileIndex (Directory, Name, Size, Created, Modified, Attributes, LastScanned)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(Directory, Name) DO UPDATE SET
                Size = excluded.Size,
                Created = excluded.Created,
                Modified = excluded.Modified,
                Attributes = excluded.Attributes,
                LastScanned = excluded.LastScanned",
            params![
                entry.directory,
                entry.name,
                entry.size,
                entry.created,
                entry.modified,
                entry.attributes,
                stamped,
            ],
        )?;
        Ok(())
    }

    /// Batch upsert inside a single transaction with a prepared statement.
    pub fn upsert_batch(conn: &mut Connection, entries: &[IndexEntry]) -> Result<(), IndexStoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let stamped = now_iso();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO FileIndex (Directory, Name, Size, Created, Modified, Attributes, LastScanned)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(Directory, Name) DO UPDATE SET
                    Size = excluded.Size,
                    Created = excluded.Created,
                    Modified = excluded.Modified,
                    Attributes = excluded.Attributes,
                    LastScanned = excluded.LastScanned",
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.directory,
                    entry.name,
                    entry.size,
                    entry.created,
                    entry.modified,
                    entry.attributes,
                    stamped,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn delete_by_path(conn: &Connection, full_path: &str) -> Result<(), IndexStoreError> {
        let (directory, name) = split_path(full_path);
        conn.execute(
            "DELETE FROM FileIndex WHERE Directory = ?1 AND Name = ?2",
            params![directory, name],
        )?;
        Ok(())
    }

    /// Delete every row whose directory is `dir` or nested under it.
    pub fn delete_by_directory_prefix(conn: &Connection, dir: &str) -> Result<usize, IndexStoreError> {
        let like_pattern = format!("{}/%", dir);
        let n = conn.execute(
            "DELETE FROM FileIndex WHERE Directory = ?1 OR Directory LIKE ?2",
            params![dir, like_pattern],
        )?;
        Ok(n)
    }

    /// Reconciliation sweep: delete every row whose `LastScanned` predates
    /// `cutoff` (ISO-8601). Used after a scanner run to drop rows for files
    /// that no longer exist on disk.
    pub fn delete_older_than(conn: &Connection, cutoff: &str) -> Result<usize, IndexStoreError> {
        let n = conn.execute("DELETE FROM FileIndex WHERE LastScanned < ?1", params![cutoff])?;
        Ok(n)
    }

    /// Rename index rows by prefix substitution (Open Question resolution:
    /// directory renames re-key their children atomically).
    pub fn rename_directory_prefix(conn: &mut Connection, old_dir: &str, new_dir: &str) -> Result<usize, IndexStoreError> {
        let tx = conn.transaction()?;
        let mut updated = 0usize;
        {
            let mut select = tx.prepare("SELECT Directory, Name FROM FileIndex WHERE Directory = ?1 OR Directory LIKE ?2")?;
            let like_pattern = format!("{}/%", old_dir);
            let rows: Vec<(String, String)> = select
                .query_map(params![old_dir, like_pattern], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<_, _>>()?;
            drop(select);

            let mut update = tx.prepare_cached("UPDATE FileIndex SET Directory = ?1 WHERE Directory = ?2 AND Name = ?3")?;
            for (directory, name) in rows {
                let replaced = if directory == old_dir {
                    new_dir.to_string()
                } else {
                    format!("{new_dir}{}", &directory[old_dir.len()..])
                };
                update.execute(params![replaced, directory, name])?;
                updated += 1;
            }
        }
        tx.commit()?;
        Ok(updated)
    }

    // ── TrackingFile read/write ────────────────────────────────────────

    pub fn get_tracked_file(&self, full_path: &str) -> Result<Option<TrackedFileRow>, IndexStoreError> {
        self.read_conn
            .query_row(
                "SELECT FullPath, EnabledAt, LastHash FROM TrackingFile WHERE FullPath = ?1",
                params![full_path],
                row_to_tracked,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_tracked_files(&self) -> Result<Vec<TrackedFileRow>, IndexStoreError> {
        let mut stmt = self.read_conn.prepare("SELECT FullPath, EnabledAt, LastHash FROM TrackingFile")?;
        let rows = stmt.query_map([], row_to_tracked)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn upsert_tracked_file(conn: &Connection, row: &TrackedFileRow) -> Result<(), IndexStoreError> {
        conn.execute(
            "INSERT INTO TrackingFile (FullPath, EnabledAt, LastHash) VALUES (?1, ?2, ?3)
             ON CONFLICT(FullPath) DO UPDATE SET EnabledAt = excluded.EnabledAt, LastHash = excluded.LastHash",
            params![row.full_path, row.enabled_at, row.last_hash],
        )?;
        Ok(())
    }

    pub fn delete_tracked_file(conn: &Connection, full_path: &str) -> Result<(), IndexStoreError> {
        conn.execute("DELETE FROM TrackingFile WHERE FullPath = ?1", params![full_path])?;
        Ok(())
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<IndexEntry> {
    Ok(IndexEntry {
        directory: row.get(0)?,
        name: row.get(1)?,
        size: row.get(2)?,
        created: row.get(3)?,
        modified: row.get(4)?,
        attributes: row.get(5)?,
        last_scanned: row.get(6)?,
    })
}

fn row_to_tracked(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackedFileRow> {
    Ok(TrackedFileRow {
        full_path: row.get(0)?,
        enabled_at: row.get(1)?,
        last_hash: row.get(2)?,
    })
}

fn escape_like(input: &str) -> String {
    input.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Split a full path into `(directory, name)` using `/` as the separator
/// (paths are normalized to forward slashes before reaching the store).
fn split_path(full_path: &str) -> (String, String) {
    match full_path.rfind('/') {
        Some(0) => ("/".to_string(), full_path[1..].to_string()),
        Some(pos) => (full_path[..pos].to_string(), full_path[pos + 1..].to_string()),
        None => (String::new(), full_path.to_string()),
    }
}

// ── Tests ────────────────────────────────────────────────────────────

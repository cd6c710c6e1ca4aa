//! Content-addressed backup copies under a hidden sidecar directory.
//!
//! A tracked file's backup lives at
//! `<nearest-enclosing-sidecar>/backups/<md5(relative_path)>.bak`, where the
//! relative path is anchored at the nearest enclosing sidecar directory —
//! not the mole root — so backups stay localized to the smallest practical
//! scope (Design Notes, "Backup path collisions"). Backups are overwritten
//! in place and refreshed after every content-changed event is emitted.

use std::path::{Path, PathBuf};

use filetime::FileTime;

const BACKUPS_SUBDIR: &str = "backups";

#[derive(Debug)]
pub enum BackupError {
    Io(std::io::Error),
}

impl std::fmt::Display for BackupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "backup I/O error: {e}"),
        }
    }
}

impl std::error::Error for BackupError {}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Places, refreshes, and removes backup blobs for tracked files.
pub struct BackupStore {
    sidecar_name: String,
}

impl BackupStore {
    pub fn new(sidecar_name: impl Into<String>) -> Self {
        Self {
            sidecar_name: sidecar_name.into(),
        }
    }

    /// Find the nearest existing sidecar directory by walking up from
    /// `file_path`'s parent, creating one in the file's own directory if
    /// none is found on the way up to `mole_root`.
    pub fn sidecar_dir_for(&self, mole_root: &Path, file_path: &Path) -> Result<PathBuf, BackupError> {
        let file_dir = file_path.parent().unwrap_or(file_path);
        let mut cursor = file_dir;
        loop {
            let candidate = cursor.join(&self.sidecar_name);
            if candidate.is_dir() {
                return Ok(candidate);
            }
            if cursor == mole_root || cursor.parent().is_none() {
                break;
            }
            cursor = cursor.parent().unwrap();
        }

        let created = file_dir.join(&self.sidecar_name);
        std::fs::create_dir_all(&created)?;
        hide_on_windows(&created);
        Ok(created)
    }

    /// Deterministic backup path for `file_path`, anchored at the nearest
    /// sidecar under `mole_root`.
    pub fn backup_path(&self, mole_root: &Path, file_path: &Path) -> Result<PathBuf, BackupError> {
        let sidecar = self.sidecar_dir_for(mole_root, file_path)?;
        let relative = crate::path_normalizer::relative(mole_root, file_path).unwrap_or_else(|| file_path.to_path_buf());
        let digest = format!("{:x}", md5::compute(relative.to_string_lossy().as_bytes()));
        Ok(sidecar.join(BACKUPS_SUBDIR).join(format!("{digest}.bak")))
    }

    pub fn has_backup(&self, mole_root: &Path, file_path: &Path) -> Result<bool, BackupError> {
        Ok(self.backup_path(mole_root, file_path)?.is_file())
    }

    /// Copy `file_path`'s content to its backup location, preserving mtime
    /// and atime. Overwrites any existing backup in place.
    pub fn backup(&self, mole_root: &Path, file_path: &Path) -> Result<PathBuf, BackupError> {
        let dest = self.backup_path(mole_root, file_path)?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(file_path, &dest)?;

        let source_meta = std::fs::metadata(file_path)?;
        let mtime = FileTime::from_last_modification_time(&source_meta);
        let atime = FileTime::from_last_access_time(&source_meta);
        filetime::set_file_times(&dest, atime, mtime)?;

        Ok(dest)
    }

    pub fn delete_backup(&self, mole_root: &Path, file_path: &Path) -> Result<(), BackupError> {
        let dest = self.backup_path(mole_root, file_path)?;
        if dest.is_file() {
            std::fs::remove_file(dest)?;
        }
        Ok(())
    }
}

#[cfg(not(target_os = "windows"))]
fn hide_on_windows(_dir: &Path) {}

#[cfg(target_os = "windows")]
fn hide_on_windows(dir: &Path) {
    use std::os::windows::ffi::OsStrExt;
    use std::os::windows::fs::MetadataExt;

    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;

    #[link(name = "kernel32")]
    extern "system" {
        fn SetFileAttributesW(lpfilename: *const u16, dwfileattributes: u32) -> i32;
    }

    let Ok(meta) = std::fs::metadata(dir) else {
        return;
    };
    let attrs = meta.file_attributes() | FILE_ATTRIBUTE_HIDDEN;
    let wide: Vec<u16> = dir.as_os_str().encode_wide().chain(std::iter::once(0)).collect();
    // SAFETY: `wide` is a valid, NUL-terminated UTF-16 buffer kept alive for
    // the duration of the call; the return value is not a pointer.
    let ok = unsafe { SetFileAttributesW(wide.as_ptr(), attrs) };
    if ok == 0 {
        log::warn!("failed to set hidden attribute on {}", dir.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_roundtrip_produces_identical_bytes() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("note.txt");
        std::fs::write(&file, b"hello").unwrap();

        let store = BackupStore::new(".hill");
        let backup_path = store.backup(root.path(), &file).unwrap();

        assert_eq!(std::fs::read(&backup_path).unwrap(), b"hello");
        assert!(store.has_backup(root.path(), &file).unwrap());
    }

    #[test]
    fn backup_preserves_mtime() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("note.txt");
        std::fs::write(&file, b"hello").unwrap();

        let store = BackupStore::new(".hill");
        let backup_path = store.backup(root.path(), &file).unwrap();

        let src_mtime = FileTime::from_last_modification_time(&std::fs::metadata(&file).unwrap());
        let dst_mtime = FileTime::from_last_modification_time(&std::fs::metadata(&backup_path).unwrap());
        assert_eq!(src_mtime, dst_mtime);
    }

    #[test]
    fn backup_is_overwritten_in_place() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("note.txt");
        std::fs::write(&file, b"v1").unwrap();

        let store = BackupStore::new(".hill");
        let path1 = store.backup(root.path(), &file).unwrap();

        std::fs::write(&file, b"v2-longer").unwrap();
        let path2 = store.backup(root.path(), &file).unwrap();

        assert_eq!(path1, path2);
        assert_eq!(std::fs::read(&path2).unwrap(), b"v2-longer");
    }

    #[test]
    fn delete_backup_removes_file() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("note.txt");
        std::fs::write(&file, b"hello").unwrap();

        let store = BackupStore::new(".hill");
        store.backup(root.path(), &file).unwrap();
        store.delete_backup(root.path(), &file).unwrap();

        assert!(!store.has_backup(root.path(), &file).unwrap());
    }

    #[test]
    fn nested_sidecar_is_used_over_root_sidecar() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir_all(nested.join(".hill")).unwrap();

        let file = nested.join("deep.txt");
        std::fs::write(&file, b"x").unwrap();

        let store = BackupStore::new(".hill");
        let sidecar = store.sidecar_dir_for(root.path(), &file).unwrap();
        assert_eq!(sidecar, nested.join(".hill"));
    }

    #[test]
    fn missing_sidecar_is_created_in_file_directory() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("f.txt");
        std::fs::write(&file, b"x").unwrap();

        let store = BackupStore::new(".hill");
        let sidecar = store.sidecar_dir_for(root.path(), &file).unwrap();
        assert_eq!(sidecar, root.path().join(".hill"));
        assert!(sidecar.is_dir());
    }

    #[test]
    fn backup_path_is_deterministic_md5_of_relative_path() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("f.txt");
        std::fs::write(&file, b"x").unwrap();

        let store = BackupStore::new(".hill");
        let path1 = store.backup_path(root.path(), &file).unwrap();
        let path2 = store.backup_path(root.path(), &file).unwrap();
        assert_eq!(path1, path2);
        assert!(path1.to_string_lossy().ends_with(".bak"));
    }
}

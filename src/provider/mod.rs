//! Storage provider abstraction.
//!
//! A single capability trait stands in for local disk, remote, and cloud
//! backends. Required methods cover read-side access; mutation methods
//! default to `Err(ProviderError::NotSupported)` so a minimal provider only
//! has to implement what it can actually do.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::FileMoleError;
use crate::mole::MoleKind;

#[derive(Debug)]
pub enum ProviderError {
    NotSupported,
    NotFound(PathBuf),
    Io(io::Error),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotSupported => write!(f, "operation not supported by this provider"),
            Self::NotFound(p) => write!(f, "not found: {}", p.display()),
            Self::Io(e) => write!(f, "provider I/O error: {e}"),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<io::Error> for ProviderError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(PathBuf::new()),
            _ => Self::Io(err),
        }
    }
}

/// Metadata for a single file or directory entry, as reported by a
/// provider's listing.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,
    pub is_directory: bool,
    pub size: u64,
    pub created: String,
    pub modified: String,
    pub attributes: u32,
}

/// Capability interface a storage backend implements. Local is the only
/// backend implemented in this crate; Remote/Cloud are resolved by the
/// factory to a `NotSupported` stub until a real backend is registered.
pub trait StorageProvider: Send + Sync {
    fn get(&self, path: &Path) -> Result<FileInfo, ProviderError>;
    fn list_files(&self, dir: &Path) -> Result<Vec<FileInfo>, ProviderError>;
    fn list_directories(&self, dir: &Path) -> Result<Vec<PathBuf>, ProviderError>;
    fn exists(&self, path: &Path) -> bool;
    fn open_read(&self, path: &Path) -> Result<Box<dyn io::Read + Send>, ProviderError>;
    fn open_write(&self, path: &Path) -> Result<Box<dyn io::Write + Send>, ProviderError>;

    fn move_item(&self, _from: &Path, _to: &Path) -> Result<(), ProviderError> {
        Err(ProviderError::NotSupported)
    }

    fn copy(&self, _from: &Path, _to: &Path) -> Result<(), ProviderError> {
        Err(ProviderError::NotSupported)
    }

    fn rename(&self, _from: &Path, _to: &Path) -> Result<(), ProviderError> {
        Err(ProviderError::NotSupported)
    }

    fn delete(&self, _path: &Path) -> Result<(), ProviderError> {
        Err(ProviderError::NotSupported)
    }
}

/// Local-disk backend. The only `StorageProvider` this crate ships.
pub struct LocalProvider;

impl StorageProvider for LocalProvider {
    fn get(&self, path: &Path) -> Result<FileInfo, ProviderError> {
        let meta = std::fs::metadata(path)?;
        Ok(to_file_info(path, &meta))
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<FileInfo>, ProviderError> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if meta.is_file() {
                out.push(to_file_info(&entry.path(), &meta));
            }
        }
        Ok(out)
    }

    fn list_directories(&self, dir: &Path) -> Result<Vec<PathBuf>, ProviderError> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                out.push(entry.path());
            }
        }
        Ok(out)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn io::Read + Send>, ProviderError> {
        Ok(Box::new(std::fs::File::open(path)?))
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn io::Write + Send>, ProviderError> {
        Ok(Box::new(std::fs::File::create(path)?))
    }

    fn move_item(&self, from: &Path, to: &Path) -> Result<(), ProviderError> {
        std::fs::rename(from, to).map_err(Into::into)
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<(), ProviderError> {
        std::fs::copy(from, to).map(|_| ()).map_err(Into::into)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), ProviderError> {
        std::fs::rename(from, to).map_err(Into::into)
    }

    fn delete(&self, path: &Path) -> Result<(), ProviderError> {
        if path.is_dir() {
            std::fs::remove_dir_all(path).map_err(Into::into)
        } else {
            std::fs::remove_file(path).map_err(Into::into)
        }
    }
}

fn to_file_info(path: &Path, meta: &std::fs::Metadata) -> FileInfo {
    use chrono::{DateTime, Utc};

    let created = meta
        .created()
        .map(|t| DateTime::<Utc>::from(t).to_rfc3339())
        .unwrap_or_default();
    let modified = meta
        .modified()
        .map(|t| DateTime::<Utc>::from(t).to_rfc3339())
        .unwrap_or_default();

    FileInfo {
        path: path.to_path_buf(),
        is_directory: meta.is_dir(),
        size: meta.len(),
        created,
        modified,
        attributes: 0,
    }
}

/// Provider that always rejects, standing in for a Remote/Cloud kind with
/// no backend registered yet.
pub struct UnsupportedProvider;

impl StorageProvider for UnsupportedProvider {
    fn get(&self, _path: &Path) -> Result<FileInfo, ProviderError> {
        Err(ProviderError::NotSupported)
    }

    fn list_files(&self, _dir: &Path) -> Result<Vec<FileInfo>, ProviderError> {
        Err(ProviderError::NotSupported)
    }

    fn list_directories(&self, _dir: &Path) -> Result<Vec<PathBuf>, ProviderError> {
        Err(ProviderError::NotSupported)
    }

    fn exists(&self, _path: &Path) -> bool {
        false
    }

    fn open_read(&self, _path: &Path) -> Result<Box<dyn io::Read + Send>, ProviderError> {
        Err(ProviderError::NotSupported)
    }

    fn open_write(&self, _path: &Path) -> Result<Box<dyn io::Write + Send>, ProviderError> {
        Err(ProviderError::NotSupported)
    }
}

/// Resolves a `(kind, provider_name)` pair to a concrete backend.
pub fn resolve_provider(kind: &MoleKind) -> Box<dyn StorageProvider> {
    match kind {
        MoleKind::Local => Box::new(LocalProvider),
        MoleKind::Remote { .. } | MoleKind::Cloud { .. } => Box::new(UnsupportedProvider),
    }
}

/// Boundary wrapper around [`StorageProvider::move_item`] for direct
/// callers: a provider that refuses the move because it doesn't support
/// mutation at all is reported as the crate-level "cross-provider" kind,
/// since from a caller's perspective an unsupported destination is
/// indistinguishable from two different providers that can't be bridged.
pub fn move_checked(provider: &dyn StorageProvider, from: &Path, to: &Path) -> Result<(), FileMoleError> {
    provider.move_item(from, to).map_err(|err| match err {
        ProviderError::NotSupported => FileMoleError::UnsupportedCrossProvider {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        },
        other => FileMoleError::Provider(other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_provider_roundtrips_file_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"hello").unwrap();

        let provider = LocalProvider;
        let info = provider.get(&file).unwrap();
        assert_eq!(info.size, 5);
        assert!(!info.is_directory);
    }

    #[test]
    fn local_provider_lists_files_and_directories_separately() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let provider = LocalProvider;
        assert_eq!(provider.list_files(dir.path()).unwrap().len(), 1);
        assert_eq!(provider.list_directories(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn unsupported_provider_rejects_cross_provider_style_calls() {
        let provider = resolve_provider(&MoleKind::Cloud { provider_name: "dropbox".into() });
        assert!(matches!(provider.get(Path::new("/x")), Err(ProviderError::NotSupported)));
    }

    #[test]
    fn local_move_renames_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        std::fs::write(&from, b"x").unwrap();

        let provider = LocalProvider;
        provider.move_item(&from, &to).unwrap();
        assert!(!from.exists());
        assert!(to.exists());
    }

    #[test]
    fn move_checked_reports_unsupported_moves_as_cross_provider() {
        let provider = resolve_provider(&MoleKind::Cloud { provider_name: "dropbox".into() });
        let result = move_checked(provider.as_ref(), Path::new("/a.txt"), Path::new("/b.txt"));
        assert!(matches!(result, Err(FileMoleError::UnsupportedCrossProvider { .. })));
    }

    #[test]
    fn move_checked_succeeds_for_a_supported_provider() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        std::fs::write(&from, b"x").unwrap();

        let provider = LocalProvider;
        move_checked(&provider, &from, &to).unwrap();
        assert!(to.exists());
    }
}

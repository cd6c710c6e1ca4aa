//! Binary diff strategy: whole-file SHA-256 comparison.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use super::DiffResult;

#[derive(Debug)]
pub enum BinaryDiffError {
    Io(std::io::Error),
}

impl std::fmt::Display for BinaryDiffError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "binary diff I/O error: {e}"),
        }
    }
}

impl std::error::Error for BinaryDiffError {}

impl From<std::io::Error> for BinaryDiffError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

fn sha256_and_size(path: &Path) -> Result<(String, u64), std::io::Error> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), size))
}

/// `old_path` may not exist on the very first observation; it is then
/// treated as an empty zero-hash baseline so `identical` comes out `false`.
pub fn diff(old_path: &Path, new_path: &Path, is_initial: bool) -> Result<DiffResult, BinaryDiffError> {
    let (old_hash, old_size) = if old_path.is_file() {
        sha256_and_size(old_path)?
    } else {
        (format!("{:x}", Sha256::new().finalize()), 0)
    };
    let (new_hash, new_size) = sha256_and_size(new_path)?;

    let identical = old_hash == new_hash && old_size == new_size;

    Ok(DiffResult::Binary {
        old_size,
        new_size,
        old_hash,
        new_hash,
        identical,
        file_type: "binary".to_string(),
        is_changed: !identical,
        is_initial,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_files_report_identical_true() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.bin");
        let new = dir.path().join("new.bin");
        std::fs::write(&old, vec![1u8; 4096]).unwrap();
        std::fs::write(&new, vec![1u8; 4096]).unwrap();

        let result = diff(&old, &new, false).unwrap();
        match result {
            DiffResult::Binary { identical, is_changed, .. } => {
                assert!(identical);
                assert!(!is_changed);
            }
            _ => panic!("expected Binary variant"),
        }
    }

    #[test]
    fn single_byte_change_in_large_file_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.bin");
        let new = dir.path().join("new.bin");

        let size = 50 * 1024 * 1024;
        let mut content = vec![0u8; size];
        std::fs::write(&old, &content).unwrap();
        content[size / 2] = 0xFF;
        std::fs::write(&new, &content).unwrap();

        let result = diff(&old, &new, false).unwrap();
        match result {
            DiffResult::Binary { identical, old_size, new_size, .. } => {
                assert!(!identical);
                assert_eq!(old_size, new_size);
            }
            _ => panic!("expected Binary variant"),
        }
    }

    #[test]
    fn missing_old_path_is_always_changed() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("missing.bin");
        let new = dir.path().join("new.bin");
        std::fs::write(&new, b"content").unwrap();

        let result = diff(&old, &new, true).unwrap();
        assert!(result.is_changed());
    }
}

//! Cross-platform path canonicalization and sub-path tests.
//!
//! Pure helpers, no I/O failure modes beyond what `std::fs::canonicalize`
//! itself can raise. Normalization is idempotent: normalizing an already
//! normalized path returns the same string.

use std::path::{Path, PathBuf};

/// Canonicalize a path: absolute, separators collapsed, case-folded on
/// case-insensitive platforms (Windows/macOS default volumes).
///
/// Falls back to lexical normalization (no `std::fs::canonicalize`) when the
/// path doesn't exist yet, so callers can normalize paths for not-yet-created
/// files (e.g. a `created` event for a file that vanished before the
/// classifier ran).
pub fn canonicalize(path: &Path) -> PathBuf {
    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| lexical_absolute(path));
    fold_case(&to_slash_string(&absolute))
}

/// Canonicalize and return the parent directory, or the root itself if
/// `path` has no parent.
pub fn parent(path: &Path) -> PathBuf {
    let canon = canonicalize(path);
    canon.parent().map(Path::to_path_buf).unwrap_or(canon)
}

/// Return `path` relative to `base`, both canonicalized first.
///
/// Returns `None` if `path` is not under `base`.
pub fn relative(base: &Path, path: &Path) -> Option<PathBuf> {
    let base = canonicalize(base);
    let path = canonicalize(path);
    path.strip_prefix(&base).ok().map(Path::to_path_buf)
}

/// True iff the canonical form of `b` starts with the canonical form of `a`
/// followed by a path separator. Equality (`a == b`) is false: a path is not
/// a sub-path of itself.
pub fn is_sub_path(a: &Path, b: &Path) -> bool {
    let a = canonicalize(a);
    let b = canonicalize(b);
    if a == b {
        return false;
    }
    b.strip_prefix(&a).is_ok()
}

// ── Internal helpers ─────────────────────────────────────────────────

fn lexical_absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn to_slash_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(target_os = "windows")]
fn fold_case(s: &str) -> PathBuf {
    PathBuf::from(s.to_lowercase())
}

#[cfg(not(target_os = "windows"))]
fn fold_case(s: &str) -> PathBuf {
    // Case-sensitivity varies per-volume on macOS; treat the common default
    // (case-insensitive APFS) the same as Linux here since we have no
    // reliable cross-platform way to query per-volume case sensitivity
    // without a filesystem probe. Matching is left case-sensitive, which is
    // the safe default for Linux and for case-sensitive macOS volumes.
    PathBuf::from(s)
}

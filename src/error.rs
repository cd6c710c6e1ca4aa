//! Crate-level error kinds.
//!
//! Individual modules define their own error enums for the failure modes
//! specific to them (see [`crate::index::store::IndexStoreError`],
//! [`crate::scanner::ScanError`], [`crate::provider::ProviderError`]). This
//! enum is the stable set of *kinds* from the design's error handling
//! section, used at the boundaries where a result is surfaced to a direct
//! caller rather than logged and dropped inside the pipeline.

use std::fmt;
use std::path::PathBuf;

/// Stable error kinds surfaced by user-initiated operations.
#[derive(Debug)]
pub enum FileMoleError {
    /// Permission or security rejection. Internally this is suppressed into
    /// an empty enumeration result and logged once; surfaced here only when
    /// a caller directly requested the failing operation.
    PathAccessDenied(PathBuf),
    /// The path does not exist.
    PathNotFound(PathBuf),
    /// No [`crate::provider::StorageProvider`] is registered for the path's mole.
    NoProviderForPath(PathBuf),
    /// The requested operation would move or copy across two different
    /// storage providers, which this crate does not support.
    UnsupportedCrossProvider { from: PathBuf, to: PathBuf },
    /// A transient I/O error persisted past the retry budget.
    IoExhausted(std::io::Error),
    /// The operation was cancelled via the root cancellation token.
    Cancelled,
    /// An ignore rule failed to parse; the rule was skipped and the rest of
    /// the rule set loaded normally.
    IgnoreRuleInvalid { pattern: String, reason: String },
    /// A tracking operation (enable/disable/content-change handling) failed.
    Tracking(crate::tracking::TrackingError),
    /// A watch/unwatch operation failed.
    Watch(crate::watcher::WatcherError),
    /// A storage provider operation failed for a reason other than an
    /// unsupported cross-provider move (see [`Self::UnsupportedCrossProvider`]).
    Provider(crate::provider::ProviderError),
}

impl fmt::Display for FileMoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PathAccessDenied(p) => write!(f, "access denied: {}", p.display()),
            Self::PathNotFound(p) => write!(f, "path not found: {}", p.display()),
            Self::NoProviderForPath(p) => write!(f, "no provider for path: {}", p.display()),
            Self::UnsupportedCrossProvider { from, to } => {
                write!(f, "unsupported cross-provider operation: {} -> {}", from.display(), to.display())
            }
            Self::IoExhausted(e) => write!(f, "I/O retries exhausted: {e}"),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::IgnoreRuleInvalid { pattern, reason } => {
                write!(f, "invalid ignore rule {pattern:?}: {reason}")
            }
            Self::Tracking(e) => write!(f, "tracking operation failed: {e}"),
            Self::Watch(e) => write!(f, "watch operation failed: {e}"),
            Self::Provider(e) => write!(f, "provider operation failed: {e}"),
        }
    }
}

impl std::error::Error for FileMoleError {}

impl From<std::io::Error> for FileMoleError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::PathNotFound(PathBuf::new()),
            std::io::ErrorKind::PermissionDenied => Self::PathAccessDenied(PathBuf::new()),
            _ => Self::IoExhausted(err),
        }
    }
}

impl From<crate::tracking::TrackingError> for FileMoleError {
    fn from(err: crate::tracking::TrackingError) -> Self {
        Self::Tracking(err)
    }
}

impl From<crate::watcher::WatcherError> for FileMoleError {
    fn from(err: crate::watcher::WatcherError) -> Self {
        Self::Watch(err)
    }
}

impl From<crate::provider::ProviderError> for FileMoleError {
    fn from(err: crate::provider::ProviderError) -> Self {
        Self::Provider(err)
    }
}

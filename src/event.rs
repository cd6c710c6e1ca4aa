//! The public event surface emitted by the indexing pipeline.
//!
//! Downstream consumers (the out-of-scope facade) subscribe to these via
//! broadcast channels owned by the facade; this crate only produces them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::diff::DiffResult;

/// The kind of change an [`Event`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Changed,
    Deleted,
    Renamed,
}

/// A single, semantically meaningful change to a watched path.
///
/// At most one of these is emitted per logical change per the pipeline's
/// debounce/classify contract; `old_path` is set only for `Renamed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub kind: EventKind,
    pub is_directory: bool,
    pub path: PathBuf,
    pub old_path: Option<PathBuf>,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl Event {
    pub fn new(kind: EventKind, path: PathBuf, is_directory: bool) -> Self {
        Self {
            kind,
            is_directory,
            path,
            old_path: None,
            timestamp_ms: now_ms(),
        }
    }

    pub fn renamed(old_path: PathBuf, new_path: PathBuf, is_directory: bool) -> Self {
        Self {
            kind: EventKind::Renamed,
            is_directory,
            path: new_path,
            old_path: Some(old_path),
            timestamp_ms: now_ms(),
        }
    }
}

/// Emitted by the [`crate::tracking::TrackingManager`] when the four-stage
/// change detector confirms a real content change (or on the very first
/// `enable` observation, where `is_initial` is set).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentChangedEvent {
    pub path: PathBuf,
    pub diff: DiffResult,
    pub timestamp_ms: u64,
}

impl ContentChangedEvent {
    pub fn new(path: PathBuf, diff: DiffResult) -> Self {
        Self {
            path,
            diff,
            timestamp_ms: now_ms(),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renamed_event_carries_old_path() {
        let event = Event::renamed(PathBuf::from("/a/old.txt"), PathBuf::from("/a/new.txt"), false);
        assert_eq!(event.kind, EventKind::Renamed);
        assert_eq!(event.old_path, Some(PathBuf::from("/a/old.txt")));
        assert_eq!(event.path, PathBuf::from("/a/new.txt"));
    }

    #[test]
    fn created_event_has_no_old_path() {
        let event = Event::new(EventKind::Created, PathBuf::from("/a/new.txt"), false);
        assert!(event.old_path.is_none());
    }

    #[test]
    fn event_roundtrips_through_json() {
        let event = Event::new(EventKind::Created, PathBuf::from("/a/new.txt"), false);
        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.path, event.path);
        assert_eq!(parsed.kind, event.kind);
    }
}

//! Line-granular text diff strategy, backed by the `similar` crate.

use std::path::Path;

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

use super::DiffResult;

#[derive(Debug)]
pub enum TextDiffError {
    Io(std::io::Error),
}

impl std::fmt::Display for TextDiffError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "text diff I/O error: {e}"),
        }
    }
}

impl std::error::Error for TextDiffError {}

impl From<std::io::Error> for TextDiffError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineChangeTag {
    Inserted,
    Deleted,
    Modified,
    Unchanged,
}

/// One changed (or unchanged) region of the diff, expressed as a character
/// offset range into the concatenated new-side text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineChange {
    pub start: usize,
    pub end: usize,
    pub original_text: String,
    pub modified_text: String,
    pub tag: LineChangeTag,
}

/// `old_path` may not exist yet (the very first observation of a tracked
/// file); in that case every line of `new_path` is reported as inserted.
pub fn diff(old_path: &Path, new_path: &Path, is_initial: bool) -> Result<DiffResult, TextDiffError> {
    let old_text = if old_path.is_file() {
        std::fs::read_to_string(old_path).unwrap_or_default()
    } else {
        String::new()
    };
    let new_text = std::fs::read_to_string(new_path)?;

    let text_diff = TextDiff::from_lines(&old_text, &new_text);

    let mut entries = Vec::new();
    let mut offset = 0usize;
    let mut pending_delete: Option<&str> = None;

    for change in text_diff.iter_all_changes() {
        let value = change.value();
        match change.tag() {
            ChangeTag::Delete => {
                pending_delete = Some(value);
            }
            ChangeTag::Insert => {
                let start = offset;
                let end = offset + value.len();
                let tag = if pending_delete.is_some() { LineChangeTag::Modified } else { LineChangeTag::Inserted };
                entries.push(LineChange {
                    start,
                    end,
                    original_text: pending_delete.take().unwrap_or("").to_string(),
                    modified_text: value.to_string(),
                    tag,
                });
                offset = end;
            }
            ChangeTag::Equal => {
                if let Some(deleted) = pending_delete.take() {
                    entries.push(LineChange {
                        start: offset,
                        end: offset,
                        original_text: deleted.to_string(),
                        modified_text: String::new(),
                        tag: LineChangeTag::Deleted,
                    });
                }
                let start = offset;
                let end = offset + value.len();
                entries.push(LineChange {
                    start,
                    end,
                    original_text: value.to_string(),
                    modified_text: value.to_string(),
                    tag: LineChangeTag::Unchanged,
                });
                offset = end;
            }
        }
    }
    if let Some(deleted) = pending_delete.take() {
        entries.push(LineChange {
            start: offset,
            end: offset,
            original_text: deleted.to_string(),
            modified_text: String::new(),
            tag: LineChangeTag::Deleted,
        });
    }

    let is_changed = entries.iter().any(|e| e.tag != LineChangeTag::Unchanged);

    Ok(DiffResult::Text {
        entries,
        file_type: "text".to_string(),
        is_changed,
        is_initial,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &std::path::Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn detects_deleted_and_inserted_lines() {
        let dir = tempfile::tempdir().unwrap();
        let old = write(dir.path(), "old.txt", "hello\nworld");
        let new = write(dir.path(), "new.txt", "hello\nthere");

        let result = diff(&old, &new, false).unwrap();
        match result {
            DiffResult::Text { entries, is_changed, .. } => {
                assert!(is_changed);
                assert!(entries.iter().any(|e| e.tag == LineChangeTag::Modified && e.original_text.contains("world")));
            }
            _ => panic!("expected Text variant"),
        }
    }

    #[test]
    fn identical_content_reports_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let old = write(dir.path(), "old.txt", "same\ncontent\n");
        let new = write(dir.path(), "new.txt", "same\ncontent\n");

        let result = diff(&old, &new, false).unwrap();
        assert!(!result.is_changed());
    }

    #[test]
    fn missing_old_path_reports_all_inserted() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("missing.txt");
        let new = write(dir.path(), "new.txt", "fresh content\n");

        let result = diff(&old, &new, true).unwrap();
        match result {
            DiffResult::Text { entries, is_initial, .. } => {
                assert!(is_initial);
                assert!(entries.iter().any(|e| e.tag == LineChangeTag::Inserted));
            }
            _ => panic!("expected Text variant"),
        }
    }
}

//! Document diff strategy for office/PDF files.
//!
//! These formats are container formats (zip-based or PDF object streams);
//! without a crate to parse them structurally, the extractor here pulls out
//! the printable text runs directly from the raw bytes and treats each run
//! as one "element". This is a deliberately narrow stand-in for real
//! structural extraction (paragraph/cell/slide boundaries), chosen because
//! no document-parsing crate was available to depend on — it is good enough
//! to detect and localize text content changes, not to reconstruct layout.

use std::path::Path;

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

use super::DiffResult;

#[derive(Debug)]
pub enum DocumentDiffError {
    Io(std::io::Error),
}

impl std::fmt::Display for DocumentDiffError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "document diff I/O error: {e}"),
        }
    }
}

impl std::error::Error for DocumentDiffError {}

impl From<std::io::Error> for DocumentDiffError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementChangeTag {
    Inserted,
    Deleted,
    Modified,
    Unchanged,
}

/// One extracted text-run ("element") and how it changed between the two
/// revisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementChange {
    pub element_index: usize,
    pub original_text: String,
    pub modified_text: String,
    pub tag: ElementChangeTag,
}

const MIN_RUN_LEN: usize = 4;

/// Extract printable ASCII text runs of at least [`MIN_RUN_LEN`] bytes,
/// which for zip-compressed office formats mostly surfaces XML tag names and
/// embedded shared strings, and for PDF surfaces literal text operands —
/// enough signal to localize edits without parsing the container.
fn extract_text_runs(bytes: &[u8]) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current = Vec::new();

    for &byte in bytes {
        if byte.is_ascii_graphic() || byte == b' ' {
            current.push(byte);
        } else if !current.is_empty() {
            if current.len() >= MIN_RUN_LEN {
                runs.push(String::from_utf8_lossy(&current).into_owned());
            }
            current.clear();
        }
    }
    if current.len() >= MIN_RUN_LEN {
        runs.push(String::from_utf8_lossy(&current).into_owned());
    }
    runs
}

pub fn diff(old_path: &Path, new_path: &Path, is_initial: bool) -> Result<DiffResult, DocumentDiffError> {
    let old_runs = if old_path.is_file() {
        extract_text_runs(&std::fs::read(old_path)?)
    } else {
        Vec::new()
    };
    let new_runs = extract_text_runs(&std::fs::read(new_path)?);

    let old_flat = old_runs.join("\n");
    let new_flat = new_runs.join("\n");
    let text_diff = TextDiff::from_lines(&old_flat, &new_flat);

    let mut elements = Vec::new();
    let mut index = 0usize;
    let mut pending_delete: Option<&str> = None;

    for change in text_diff.iter_all_changes() {
        let value = change.value().trim_end_matches('\n');
        match change.tag() {
            ChangeTag::Delete => pending_delete = Some(value),
            ChangeTag::Insert => {
                let tag = if pending_delete.is_some() { ElementChangeTag::Modified } else { ElementChangeTag::Inserted };
                elements.push(ElementChange {
                    element_index: index,
                    original_text: pending_delete.take().unwrap_or("").to_string(),
                    modified_text: value.to_string(),
                    tag,
                });
                index += 1;
            }
            ChangeTag::Equal => {
                if let Some(deleted) = pending_delete.take() {
                    elements.push(ElementChange {
                        element_index: index,
                        original_text: deleted.to_string(),
                        modified_text: String::new(),
                        tag: ElementChangeTag::Deleted,
                    });
                    index += 1;
                }
                elements.push(ElementChange {
                    element_index: index,
                    original_text: value.to_string(),
                    modified_text: value.to_string(),
                    tag: ElementChangeTag::Unchanged,
                });
                index += 1;
            }
        }
    }
    if let Some(deleted) = pending_delete.take() {
        elements.push(ElementChange {
            element_index: index,
            original_text: deleted.to_string(),
            modified_text: String::new(),
            tag: ElementChangeTag::Deleted,
        });
    }

    let is_changed = elements.iter().any(|e| e.tag != ElementChangeTag::Unchanged);

    Ok(DiffResult::Document {
        elements,
        file_type: "document".to_string(),
        is_changed,
        is_initial,
    })
}

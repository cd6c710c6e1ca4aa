//! Diff strategy selection and the shared [`DiffResult`] model.
//!
//! Three strategies share one entry point, [`DiffEngine::generate`]: line
//! diffs for text, element-regrouped text diffs for documents, and a
//! whole-file hash comparison for everything else.

pub mod binary;
pub mod document;
pub mod text;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use binary::BinaryDiffError;
pub use document::{DocumentDiffError, ElementChange};
pub use text::{LineChange, LineChangeTag, TextDiffError};

/// The diff strategy selected for a given file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffStrategy {
    Text,
    Document,
    Binary,
}

/// The outcome of comparing a file against its backup baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DiffResult {
    Text {
        entries: Vec<LineChange>,
        file_type: String,
        is_changed: bool,
        is_initial: bool,
    },
    Document {
        elements: Vec<ElementChange>,
        file_type: String,
        is_changed: bool,
        is_initial: bool,
    },
    Binary {
        old_size: u64,
        new_size: u64,
        old_hash: String,
        new_hash: String,
        identical: bool,
        file_type: String,
        is_changed: bool,
        is_initial: bool,
    },
}

impl DiffResult {
    pub fn is_changed(&self) -> bool {
        match self {
            Self::Text { is_changed, .. } => *is_changed,
            Self::Document { is_changed, .. } => *is_changed,
            Self::Binary { is_changed, .. } => *is_changed,
        }
    }
}

#[derive(Debug)]
pub enum DiffError {
    Text(TextDiffError),
    Document(DocumentDiffError),
    Binary(BinaryDiffError),
}

impl std::fmt::Display for DiffError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(e) => write!(f, "{e}"),
            Self::Document(e) => write!(f, "{e}"),
            Self::Binary(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DiffError {}

impl From<TextDiffError> for DiffError {
    fn from(e: TextDiffError) -> Self {
        Self::Text(e)
    }
}

impl From<DocumentDiffError> for DiffError {
    fn from(e: DocumentDiffError) -> Self {
        Self::Document(e)
    }
}

impl From<BinaryDiffError> for DiffError {
    fn from(e: BinaryDiffError) -> Self {
        Self::Binary(e)
    }
}

/// Stateless strategy selector + dispatcher.
pub struct DiffEngine;

const DOCUMENT_EXTENSIONS: &[&str] = &["docx", "xlsx", "pptx", "pdf"];

impl DiffEngine {
    /// Text for MIME-text/JSON/XML/JS paths, Document for office/PDF
    /// extensions, Binary otherwise.
    pub fn strategy_for(path: &Path) -> DiffStrategy {
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if DOCUMENT_EXTENSIONS.iter().any(|d| d.eq_ignore_ascii_case(ext)) {
                return DiffStrategy::Document;
            }
        }

        let guess = mime_guess::from_path(path).first();
        let is_text_mime = guess
            .as_ref()
            .map(|m| m.type_() == mime_guess::mime::TEXT)
            .unwrap_or(false);
        let is_known_text_subtype = guess
            .as_ref()
            .map(|m| matches!(m.subtype().as_str(), "json" | "xml" | "javascript"))
            .unwrap_or(false);

        if is_text_mime || is_known_text_subtype {
            DiffStrategy::Text
        } else {
            DiffStrategy::Binary
        }
    }

    pub fn generate(old_path: &Path, new_path: &Path, is_initial: bool) -> Result<DiffResult, DiffError> {
        match Self::strategy_for(new_path) {
            DiffStrategy::Text => Ok(text::diff(old_path, new_path, is_initial)?),
            DiffStrategy::Document => Ok(document::diff(old_path, new_path, is_initial)?),
            DiffStrategy::Binary => Ok(binary::diff(old_path, new_path, is_initial)?),
        }
    }
}

//! Core data models used throughout the pipeline.
//!
//! These types represent the source files, normalized documents, and
//! search hits that flow through the indexing and retrieval paths.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File formats the normalizer knows how to turn into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatKind {
    Text,
    Pdf,
    Json,
    Spreadsheet,
}

impl FormatKind {
    /// Resolve a format from a file extension (case-insensitive, no dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "md" => Some(FormatKind::Text),
            "pdf" => Some(FormatKind::Pdf),
            "json" => Some(FormatKind::Json),
            "xlsx" | "csv" => Some(FormatKind::Spreadsheet),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// A tracked file discovered by the change tracker's directory walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute (or root-joined) path used for reading.
    pub path: PathBuf,
    /// Root-relative path with `/` separators; the fingerprint map key.
    pub key: String,
    /// Hex-encoded SHA-256 of the file bytes.
    pub fingerprint: String,
    pub format: FormatKind,
}

/// Normalized plain-text document. `text` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    /// Root-relative path the document was produced from, when known.
    /// Lets a re-ingested file replace its earlier document in place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Document {
    /// Build a document, rejecting empty or whitespace-only text.
    pub fn new(text: impl Into<String>, source: Option<String>) -> Option<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return None;
        }
        Some(Self { text, source })
    }
}

/// Ordered document sequence; position `i` is vector `i` in the index.
pub type Corpus = Vec<Document>;

/// A single vector search hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    /// Position of the document in the corpus.
    pub position: usize,
    /// Inner product of normalized vectors (cosine similarity).
    pub score: f32,
}

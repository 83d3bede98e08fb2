//! Document normalizer: one source file in, at most one plain-text document out.
//!
//! Dispatches on [`FormatKind`]. Plain text is read as UTF-8 and trimmed,
//! JSON is flattened into `Key: value` lines (see [`flatten_json`]), and
//! PDF/XLSX go through [`crate::extract`]. Any failure, or text that is
//! empty after trimming, drops the file; the caller carries on.

use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::ExtractError;
use crate::extract;
use crate::models::{Document, FormatKind, SourceFile};

/// Normalize a tracked file. Returns `None` when the file is dropped.
pub fn normalize(file: &SourceFile) -> Option<Document> {
    match extract_text(&file.path, file.format) {
        Ok(text) => {
            let doc = Document::new(text.trim(), Some(file.key.clone()));
            if doc.is_none() {
                debug!(path = %file.key, "dropping file with no extractable text");
            }
            doc
        }
        Err(e) => {
            warn!(path = %file.key, error = %e, "dropping file that failed extraction");
            None
        }
    }
}

/// Read and convert a file of the given format to plain text.
pub fn extract_text(path: &Path, format: FormatKind) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path)?;
    match format {
        FormatKind::Text => Ok(String::from_utf8(bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?),
        FormatKind::Json => {
            let value: Value = serde_json::from_slice(&bytes)?;
            Ok(flatten_json(&value))
        }
        FormatKind::Pdf => extract::extract_pdf(&bytes),
        FormatKind::Spreadsheet => match extension(path).as_deref() {
            Some("xlsx") => extract::extract_xlsx(&bytes),
            Some("csv") => extract::extract_csv(&bytes),
            other => Err(ExtractError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        },
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Flatten a JSON value into text for embedding and fact extraction.
///
/// - object: one `Key: value` line per field, in document order
/// - list of objects: one line per item, its fields joined by `, `
/// - list of scalars: one line per item
/// - anything else: its string form
pub fn flatten_json(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}: {}", capitalize(k), scalar_text(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", capitalize(k), scalar_text(v)))
                    .collect::<Vec<_>>()
                    .join(", "),
                other => scalar_text(other),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => scalar_text(other),
    }
}

/// Strings render bare, everything else as compact JSON.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn capitalize(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

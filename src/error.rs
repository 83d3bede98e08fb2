//! Typed errors for the places where callers branch on the failure kind.
//!
//! Command-level code uses `anyhow`; these enums cover index state,
//! generation, and format extraction.

/// Failures of the vector index build/load path.
///
/// These are fatal to the operation that raised them: the caller must not
/// serve queries against a stale or absent index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("cannot build an index over an empty corpus")]
    EmptyCorpus,

    #[error("index holds {vectors} vectors but corpus holds {documents} documents")]
    LengthMismatch { vectors: usize, documents: usize },

    #[error("embedding dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("clustered index used before training")]
    NotTrained,

    #[error("index file is corrupt: {0}")]
    Corrupt(String),

    #[error("index I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedding failed: {0}")]
    Embedding(String),
}

/// Failures reported by a [`Generator`](crate::generate::Generator).
///
/// Never propagated past the retriever: each one becomes a failed candidate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("credential not found: {0}")]
    MissingCredential(String),

    #[error("no valid context found")]
    EmptyContext,

    #[error("generation request failed: {0}")]
    Transport(String),

    #[error("generation returned no answer")]
    EmptyResponse,

    #[error("generation provider is disabled")]
    Disabled,
}

/// Extraction error: no panic, the normalizer drops the file.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("spreadsheet extraction failed: {0}")]
    Spreadsheet(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

//! Index refresh progress reporting.
//!
//! Reports what `fxrag index` is doing (scanning, normalizing changed
//! files, embedding, saving) so long rebuilds are observable. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for an index refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshProgressEvent {
    /// Walking the data root and fingerprinting files. Total unknown.
    Scanning,
    /// Changed files normalized so far.
    Normalizing { n: u64, total: u64 },
    /// Corpus handed to the embedder.
    Embedding { documents: u64 },
    /// Writing index and corpus.
    Saving,
}

/// Reports refresh progress. Implementations write to stderr (human or JSON).
pub trait RefreshProgressReporter: Send + Sync {
    fn report(&self, event: RefreshProgressEvent);
}

/// Human-friendly progress on stderr: "index  normalizing  12 / 1,400 files".
pub struct StderrProgress;

impl RefreshProgressReporter for StderrProgress {
    fn report(&self, event: RefreshProgressEvent) {
        let line = match &event {
            RefreshProgressEvent::Scanning => "index  scanning...\n".to_string(),
            RefreshProgressEvent::Normalizing { n, total } => format!(
                "index  normalizing  {} / {} files\n",
                format_number(*n),
                format_number(*total)
            ),
            RefreshProgressEvent::Embedding { documents } => format!(
                "index  embedding  {} documents\n",
                format_number(*documents)
            ),
            RefreshProgressEvent::Saving => "index  saving...\n".to_string(),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl RefreshProgressReporter for JsonProgress {
    fn report(&self, event: RefreshProgressEvent) {
        let obj = match &event {
            RefreshProgressEvent::Scanning => serde_json::json!({
                "event": "progress",
                "phase": "scanning"
            }),
            RefreshProgressEvent::Normalizing { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "normalizing",
                "n": n,
                "total": total
            }),
            RefreshProgressEvent::Embedding { documents } => serde_json::json!({
                "event": "progress",
                "phase": "embedding",
                "documents": documents
            }),
            RefreshProgressEvent::Saving => serde_json::json!({
                "event": "progress",
                "phase": "saving"
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl RefreshProgressReporter for NoProgress {
    fn report(&self, _event: RefreshProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn RefreshProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

//! Corpus store: the ordered document list persisted next to the index.
//!
//! Only whole-sequence load and save. Position `i` is the implicit id that
//! index search results refer to, so callers compose updates with
//! [`apply_updates`] and rebuild the index before saving the pair.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::models::{Corpus, Document};
use crate::persist::write_atomic;

pub struct CorpusStore {
    path: PathBuf,
}

impl CorpusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> Result<Corpus> {
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("Failed to read corpus: {}", self.path.display()))?;
        let corpus: Corpus = serde_json::from_slice(&bytes)
            .with_context(|| format!("Corpus file is corrupt: {}", self.path.display()))?;
        if let Some(pos) = corpus.iter().position(|d| d.text.trim().is_empty()) {
            anyhow::bail!("Corpus file holds an empty document at position {}", pos);
        }
        Ok(corpus)
    }

    pub fn save(&self, corpus: &[Document]) -> Result<()> {
        let json = serde_json::to_vec(corpus)?;
        write_atomic(&self.path, &json)
            .with_context(|| format!("Failed to write corpus: {}", self.path.display()))?;
        Ok(())
    }
}

/// Fold freshly normalized documents into an existing corpus.
///
/// A document whose `source` already appears in the corpus replaces that
/// entry in place; everything else is appended in input order. Existing
/// positions never move, and documents for files that disappeared stay.
pub fn apply_updates(mut corpus: Corpus, updates: Vec<Document>) -> Corpus {
    let mut by_source: HashMap<String, usize> = corpus
        .iter()
        .enumerate()
        .filter_map(|(i, d)| d.source.clone().map(|s| (s, i)))
        .collect();

    for doc in updates {
        match doc.source.as_ref().and_then(|s| by_source.get(s)).copied() {
            Some(pos) => corpus[pos] = doc,
            None => {
                if let Some(source) = doc.source.clone() {
                    by_source.insert(source, corpus.len());
                }
                corpus.push(doc);
            }
        }
    }
    corpus
}

//! Index refresh orchestration.
//!
//! Coordinates the offline path: change tracker → normalizer → corpus →
//! index build → paired save. Three outcomes:
//!
//! - **Cold start**: no usable index+corpus pair on disk (or `--full`).
//!   A pair built by a different embedding model or dimension counts as
//!   unusable. Previous fingerprints are ignored so every tracked file is
//!   ingested.
//! - **Warm**: the pair loads cleanly and nothing changed. Returned as is.
//! - **Incremental**: changed files are normalized and folded into the
//!   corpus (replace by source path, else append), then the index is
//!   rebuilt over the whole corpus.
//!
//! The returned [`IndexedCorpus`] has already been saved; callers never see
//! a half-built pair.

use anyhow::Result;
use tracing::{info, warn};

use crate::config::Config;
use crate::corpus::apply_updates;
use crate::embedding::Embedder;
use crate::error::IndexError;
use crate::index::{IndexBuilder, IndexedCorpus};
use crate::normalize::normalize;
use crate::progress::{RefreshProgressEvent, RefreshProgressReporter};
use crate::tracker::{ChangeTracker, FingerprintMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshKind {
    ColdStart,
    Warm,
    Incremental,
}

pub struct RefreshOutcome {
    pub data: IndexedCorpus,
    pub kind: RefreshKind,
    /// Changed files reported by the tracker.
    pub changed_files: usize,
    /// Documents produced from those files.
    pub documents_updated: usize,
}

/// Bring the persisted index up to date with the data root.
pub async fn refresh(
    config: &Config,
    embedder: &dyn Embedder,
    full: bool,
    progress: &dyn RefreshProgressReporter,
) -> Result<RefreshOutcome> {
    let existing = if full {
        info!("full rebuild requested");
        None
    } else {
        load_existing(config, embedder)
    };

    let tracker = ChangeTracker::from_config(config)?;
    let previous = if existing.is_some() {
        tracker.load_state()
    } else {
        FingerprintMap::new()
    };

    progress.report(RefreshProgressEvent::Scanning);
    let scan = tracker.scan(&previous)?;

    if scan.changed.is_empty() {
        if let Some(data) = existing {
            info!(documents = data.corpus().len(), "index is up to date");
            return Ok(RefreshOutcome {
                data,
                kind: RefreshKind::Warm,
                changed_files: 0,
                documents_updated: 0,
            });
        }
    }

    let total = scan.changed.len() as u64;
    let mut updates = Vec::with_capacity(scan.changed.len());
    for (i, file) in scan.changed.iter().enumerate() {
        if let Some(doc) = normalize(file) {
            updates.push(doc);
        }
        progress.report(RefreshProgressEvent::Normalizing {
            n: i as u64 + 1,
            total,
        });
    }
    let documents_updated = updates.len();

    // Every changed file was dropped: the saved pair is still current.
    if updates.is_empty() {
        if let Some(data) = existing {
            info!(changed = scan.changed.len(), "no changed file produced a document");
            return Ok(RefreshOutcome {
                data,
                kind: RefreshKind::Warm,
                changed_files: scan.changed.len(),
                documents_updated: 0,
            });
        }
    }

    let kind = if existing.is_some() {
        RefreshKind::Incremental
    } else {
        RefreshKind::ColdStart
    };
    let base = existing.map(IndexedCorpus::into_corpus).unwrap_or_default();
    let corpus = apply_updates(base, updates);
    if corpus.is_empty() {
        return Err(IndexError::EmptyCorpus.into());
    }

    info!(
        ?kind,
        changed = scan.changed.len(),
        documents_updated,
        corpus = corpus.len(),
        "rebuilding index"
    );
    progress.report(RefreshProgressEvent::Embedding {
        documents: corpus.len() as u64,
    });
    let index = IndexBuilder::from_config(config)
        .build(&corpus, embedder)
        .await?;
    let data = IndexedCorpus::new(corpus, index)?;

    progress.report(RefreshProgressEvent::Saving);
    data.save(config)?;

    Ok(RefreshOutcome {
        data,
        kind,
        changed_files: scan.changed.len(),
        documents_updated,
    })
}

fn load_existing(config: &Config, embedder: &dyn Embedder) -> Option<IndexedCorpus> {
    if !IndexedCorpus::exists(config) {
        info!(dir = %config.data.index_dir.display(), "no saved index, cold start");
        return None;
    }
    match IndexedCorpus::load(config) {
        Ok(data) if !data.index().matches_embedder(embedder) => {
            warn!(
                index_model = data.index().model(),
                index_dims = data.index().dims(),
                embedder_model = embedder.model_name(),
                embedder_dims = embedder.dims(),
                "saved index was built by a different embedder, cold start"
            );
            None
        }
        Ok(data) => Some(data),
        Err(e) => {
            warn!(error = %format!("{:#}", e), "saved index is unusable, cold start");
            None
        }
    }
}

//! Index statistics and health overview.
//!
//! Summarizes what is indexed: document count, index mode and dimension,
//! tracked files, and a per-directory breakdown. Used by `fxrag stats` to
//! confirm that refreshes are picking up the expected sources.

use anyhow::Result;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::index::{IndexMode, IndexedCorpus};
use crate::tracker::ChangeTracker;

#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub documents: usize,
    pub dims: usize,
    pub model: String,
    pub mode: IndexMode,
    pub index_bytes: u64,
    pub corpus_bytes: u64,
    pub tracked_files: usize,
    /// Documents per top-level directory under the data root.
    pub by_directory: BTreeMap<String, usize>,
}

pub fn collect_stats(config: &Config) -> Result<IndexStats> {
    let data = IndexedCorpus::load(config)?;
    let tracked_files = ChangeTracker::from_config(config)?.load_state().len();

    let mut by_directory = BTreeMap::new();
    for doc in data.corpus() {
        *by_directory.entry(top_directory(doc.source.as_deref())).or_insert(0) += 1;
    }

    let size = |p: std::path::PathBuf| std::fs::metadata(p).map(|m| m.len()).unwrap_or(0);
    Ok(IndexStats {
        documents: data.corpus().len(),
        dims: data.index().dims(),
        model: data.index().model().to_string(),
        mode: data.index().mode(),
        index_bytes: size(config.index_path()),
        corpus_bytes: size(config.corpus_path()),
        tracked_files,
        by_directory,
    })
}

fn top_directory(source: Option<&str>) -> String {
    match source {
        None => "(unknown)".to_string(),
        Some(key) => match key.split_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => ".".to_string(),
        },
    }
}

/// Run the stats command: load the saved index and print a summary.
pub fn run_stats(config: &Config) -> Result<()> {
    let stats = collect_stats(config)?;

    println!("Forex RAG Index Stats");
    println!("=====================");
    println!();
    println!("  Index dir:   {}", config.data.index_dir.display());
    println!("  Index size:  {}", format_bytes(stats.index_bytes));
    println!("  Corpus size: {}", format_bytes(stats.corpus_bytes));
    println!();
    println!("  Documents:   {}", stats.documents);
    println!("  Tracked:     {} files", stats.tracked_files);
    println!("  Dimension:   {}", stats.dims);
    println!("  Model:       {}", stats.model);
    match stats.mode {
        IndexMode::Exact => println!("  Mode:        exact"),
        IndexMode::Clustered { clusters, nprobe } => {
            println!("  Mode:        clustered ({} clusters, nprobe {})", clusters, nprobe)
        }
    }

    if !stats.by_directory.is_empty() {
        println!();
        println!("  By directory:");
        println!("  {:<30} {:>8}", "DIRECTORY", "DOCS");
        println!("  {}", "-".repeat(39));
        for (dir, count) in &stats.by_directory {
            println!("  {:<30} {:>8}", dir, count);
        }
    }
    println!();
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_group_by_first_path_segment() {
        assert_eq!(top_directory(Some("news/2024/a.txt")), "news");
        assert_eq!(top_directory(Some("readme.txt")), ".");
        assert_eq!(top_directory(None), "(unknown)");
    }

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}

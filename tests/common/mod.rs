#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

use forex_rag::config::Config;
use forex_rag::embedding::Embedder;
use forex_rag::error::GenerationError;
use forex_rag::generate::Generator;

pub const DIMS: usize = 32;

/// Bag-of-words embedder: each lowercase word bumps one hashed bucket.
/// Deterministic and offline, so texts sharing words land close together.
pub struct BucketEmbedder {
    pub calls: AtomicUsize,
    name: String,
    dims: usize,
}

impl BucketEmbedder {
    pub fn new() -> Self {
        Self::named("bucket", DIMS)
    }

    pub fn named(name: &str, dims: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            name: name.to_string(),
            dims,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));
            v[hash as usize % self.dims] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for BucketEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// Echoes its context back so tests can see which source answered.
pub struct EchoGenerator {
    pub calls: AtomicUsize,
}

impl EchoGenerator {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for EchoGenerator {
    fn name(&self) -> &str {
        "echo"
    }
    async fn generate(&self, query: &str, context: &[String]) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if context.is_empty() {
            return Err(GenerationError::EmptyContext);
        }
        Ok(format!("{} => {}", query, context.join(" | ")))
    }
}

pub struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    fn name(&self) -> &str {
        "failing"
    }
    async fn generate(&self, _query: &str, _context: &[String]) -> Result<String, GenerationError> {
        Err(GenerationError::Transport("connection refused".to_string()))
    }
}

/// A temp workspace with `data/` as the root and the index kept outside it.
pub struct Workspace {
    pub tmp: TempDir,
    pub config: Config,
}

impl Workspace {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("data");
        fs::create_dir_all(&root).unwrap();

        let mut config = Config::minimal();
        config.data.root = root;
        config.data.index_dir = tmp.path().join("index");
        config.tracker.state_file = tmp.path().join("index/fingerprints.json");
        Self { tmp, config }
    }

    pub fn root(&self) -> &Path {
        &self.config.data.root
    }

    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }
}

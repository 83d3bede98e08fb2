//! Vector index over document embeddings.
//!
//! Two modes share one type:
//!
//! | Mode | When | Search cost |
//! |------|------|-------------|
//! | Exact | corpus below `index.clustered_threshold` | every vector |
//! | Clustered | at or above the threshold | `nprobe` inverted lists |
//!
//! All stored vectors are L2-normalized, so the inner product is the cosine
//! similarity. A clustered index must be trained (see [`kmeans`]) before
//! vectors are added or searched; an exact index is trained from the start.
//!
//! [`IndexedCorpus`] pairs an index with the corpus it was built from and is
//! the only form in which either is persisted or served.

pub mod kmeans;
pub mod persist;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{Config, IndexConfig};
use crate::corpus::CorpusStore;
use crate::embedding::{embed_corpus, l2_normalize, Embedder};
use crate::error::IndexError;
use crate::models::{Corpus, Document, SearchHit};

/// Search mode and its parameters, as reported by [`VectorIndex::mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    Exact,
    Clustered { clusters: usize, nprobe: usize },
}

#[derive(Debug, Clone, PartialEq)]
struct Clusters {
    centroids: Vec<Vec<f32>>,
    /// Vector positions per centroid.
    lists: Vec<Vec<usize>>,
    nprobe: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dims: usize,
    /// Embedding model the vectors came from; empty when unknown.
    model: String,
    vectors: Vec<Vec<f32>>,
    clusters: Option<Clusters>,
    trained: bool,
}

impl VectorIndex {
    /// Brute-force index; no training step.
    pub fn exact(dims: usize) -> Self {
        Self {
            dims,
            model: String::new(),
            vectors: Vec::new(),
            clusters: None,
            trained: true,
        }
    }

    /// Untrained clustered index searching `nprobe` lists per query.
    pub fn clustered(dims: usize, nprobe: usize) -> Self {
        Self {
            dims,
            model: String::new(),
            vectors: Vec::new(),
            clusters: Some(Clusters {
                centroids: Vec::new(),
                lists: Vec::new(),
                nprobe: nprobe.max(1),
            }),
            trained: false,
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// True when `embedder` produces vectors this index can be searched
    /// with: same model name and, if the embedder reports one, same size.
    pub fn matches_embedder(&self, embedder: &dyn Embedder) -> bool {
        let dims_ok = embedder.dims() == 0 || embedder.dims() == self.dims;
        dims_ok && self.model == embedder.model_name()
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn mode(&self) -> IndexMode {
        match &self.clusters {
            None => IndexMode::Exact,
            Some(c) => IndexMode::Clustered {
                clusters: c.centroids.len(),
                nprobe: c.nprobe,
            },
        }
    }

    /// Set the number of lists visited per search. No effect in exact mode.
    pub fn set_nprobe(&mut self, nprobe: usize) {
        if let Some(c) = self.clusters.as_mut() {
            c.nprobe = nprobe.max(1);
        }
    }

    /// Train the coarse quantizer on `samples`. A no-op for exact indexes.
    pub fn train(
        &mut self,
        samples: &[&[f32]],
        clusters: usize,
        iterations: usize,
        rng: &mut StdRng,
    ) -> Result<(), IndexError> {
        let dims = self.dims;
        let Some(state) = self.clusters.as_mut() else {
            return Ok(());
        };
        if let Some(bad) = samples.iter().find(|s| s.len() != dims) {
            return Err(IndexError::DimensionMismatch {
                expected: dims,
                found: bad.len(),
            });
        }
        let centroids = kmeans::train(samples, clusters, iterations, rng);
        if centroids.is_empty() {
            return Err(IndexError::NotTrained);
        }
        state.lists = vec![Vec::new(); centroids.len()];
        state.centroids = centroids;
        self.trained = true;
        Ok(())
    }

    /// Append vectors; their positions continue from the current length.
    pub fn add(&mut self, vectors: Vec<Vec<f32>>) -> Result<(), IndexError> {
        if !self.trained {
            return Err(IndexError::NotTrained);
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dims) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                found: bad.len(),
            });
        }

        if let Some(state) = self.clusters.as_mut() {
            let assignments: Vec<usize> = vectors
                .par_iter()
                .map(|v| kmeans::nearest_centroid(&state.centroids, v))
                .collect();
            let base = self.vectors.len();
            for (offset, cluster) in assignments.into_iter().enumerate() {
                state.lists[cluster].push(base + offset);
            }
        }
        self.vectors.extend(vectors);
        Ok(())
    }

    /// Top `k` positions by inner product with `query`, best first.
    ///
    /// `query` should already be L2-normalized. Ties break by position.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if !self.trained {
            return Err(IndexError::NotTrained);
        }
        if query.len() != self.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                found: query.len(),
            });
        }

        let score = |position: usize| SearchHit {
            position,
            score: kmeans::dot(&self.vectors[position], query),
        };
        let mut hits: Vec<SearchHit> = match &self.clusters {
            None => (0..self.vectors.len()).into_par_iter().map(score).collect(),
            Some(state) => {
                let mut ranked: Vec<(usize, f32)> = state
                    .centroids
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (i, kmeans::dot(c, query)))
                    .collect();
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
                ranked
                    .into_iter()
                    .take(state.nprobe)
                    .flat_map(|(i, _)| state.lists[i].iter().copied())
                    .map(score)
                    .collect()
            }
        };

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.position.cmp(&b.position))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

/// Builds a [`VectorIndex`] from a corpus, choosing the mode by size.
pub struct IndexBuilder {
    config: IndexConfig,
    batch_size: usize,
    concurrency: usize,
}

impl IndexBuilder {
    pub fn new(config: IndexConfig, batch_size: usize, concurrency: usize) -> Self {
        Self {
            config,
            batch_size,
            concurrency,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.index.clone(),
            config.embedding.batch_size,
            config.embedding.concurrency,
        )
    }

    /// Embed every document and build an index over the result.
    pub async fn build(
        &self,
        corpus: &[Document],
        embedder: &dyn Embedder,
    ) -> Result<VectorIndex, IndexError> {
        if corpus.is_empty() {
            return Err(IndexError::EmptyCorpus);
        }
        let texts: Vec<String> = corpus.iter().map(|d| d.text.clone()).collect();
        let vectors = embed_corpus(embedder, &texts, self.batch_size, self.concurrency)
            .await
            .map_err(|e| IndexError::Embedding(format!("{:#}", e)))?;
        let mut index = self.build_from_embeddings(vectors)?;
        index.set_model(embedder.model_name());
        Ok(index)
    }

    /// Build an index over precomputed embeddings (normalized here).
    pub fn build_from_embeddings(
        &self,
        mut vectors: Vec<Vec<f32>>,
    ) -> Result<VectorIndex, IndexError> {
        let n = vectors.len();
        let dims = vectors.first().ok_or(IndexError::EmptyCorpus)?.len();
        if dims == 0 {
            return Err(IndexError::Embedding(
                "embedder returned zero-length vectors".to_string(),
            ));
        }
        for v in vectors.iter_mut() {
            if v.len() != dims {
                return Err(IndexError::DimensionMismatch {
                    expected: dims,
                    found: v.len(),
                });
            }
            l2_normalize(v);
        }

        if n < self.config.clustered_threshold {
            debug!(vectors = n, dims, "building exact index");
            let mut index = VectorIndex::exact(dims);
            index.add(vectors)?;
            return Ok(index);
        }

        let mut clusters = self.config.max_clusters.min(n);
        let samples = self.config.max_training_samples.min(n);
        if samples < clusters {
            let shrunk = samples.max(1);
            warn!(
                requested = clusters,
                samples,
                clusters = shrunk,
                "not enough training samples for cluster count, shrinking"
            );
            clusters = shrunk;
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let picked = rand::seq::index::sample(&mut rng, n, samples);
        let training: Vec<&[f32]> = picked.iter().map(|i| vectors[i].as_slice()).collect();

        let mut index = VectorIndex::clustered(dims, self.config.nprobe);
        index.train(&training, clusters, self.config.kmeans_iterations, &mut rng)?;
        index.add(vectors)?;
        info!(
            vectors = n,
            dims,
            clusters,
            samples,
            nprobe = self.config.nprobe,
            "built clustered index"
        );
        Ok(index)
    }
}

/// A corpus and the index built over it, kept position-aligned.
#[derive(Debug, Clone)]
pub struct IndexedCorpus {
    corpus: Corpus,
    index: VectorIndex,
}

impl IndexedCorpus {
    /// Pair a corpus with its index, rejecting a length mismatch.
    pub fn new(corpus: Corpus, index: VectorIndex) -> Result<Self, IndexError> {
        if index.len() != corpus.len() {
            return Err(IndexError::LengthMismatch {
                vectors: index.len(),
                documents: corpus.len(),
            });
        }
        Ok(Self { corpus, index })
    }

    pub fn corpus(&self) -> &[Document] {
        &self.corpus
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn into_corpus(self) -> Corpus {
        self.corpus
    }

    /// True when both persisted files are present.
    pub fn exists(config: &Config) -> bool {
        config.index_path().exists() && config.corpus_path().exists()
    }

    /// Save the corpus and then the index. Each file is replaced atomically.
    pub fn save(&self, config: &Config) -> Result<()> {
        CorpusStore::new(config.corpus_path()).save(&self.corpus)?;
        persist::save(&self.index, &config.index_path())
            .with_context(|| format!("Failed to write index: {}", config.index_path().display()))?;
        Ok(())
    }

    /// Load the pair and check alignment. `nprobe` comes from config, not
    /// from the file.
    pub fn load(config: &Config) -> Result<Self> {
        let corpus = CorpusStore::new(config.corpus_path()).load()?;
        let mut index = persist::load(&config.index_path())
            .with_context(|| format!("Failed to read index: {}", config.index_path().display()))?;
        index.set_nprobe(config.index.nprobe);
        Ok(Self::new(corpus, index)?)
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            index_dir: default_index_dir(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("data")
}
fn default_index_dir() -> PathBuf {
    PathBuf::from("data/indexes")
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            exclude_dirs: default_exclude_dirs(),
            state_file: default_state_file(),
            follow_symlinks: false,
        }
    }
}

fn default_extensions() -> Vec<String> {
    ["txt", "pdf", "json", "xlsx", "csv"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_exclude_dirs() -> Vec<String> {
    vec!["indexes".to_string(), "economic_events/raw".to_string()]
}
fn default_state_file() -> PathBuf {
    PathBuf::from("data/indexes/fingerprints.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_clustered_threshold")]
    pub clustered_threshold: usize,
    #[serde(default = "default_max_clusters")]
    pub max_clusters: usize,
    #[serde(default = "default_max_training_samples")]
    pub max_training_samples: usize,
    #[serde(default = "default_nprobe")]
    pub nprobe: usize,
    #[serde(default = "default_kmeans_iterations")]
    pub kmeans_iterations: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            clustered_threshold: default_clustered_threshold(),
            max_clusters: default_max_clusters(),
            max_training_samples: default_max_training_samples(),
            nprobe: default_nprobe(),
            kmeans_iterations: default_kmeans_iterations(),
            seed: default_seed(),
        }
    }
}

fn default_clustered_threshold() -> usize {
    1000
}
fn default_max_clusters() -> usize {
    100
}
fn default_max_training_samples() -> usize {
    10_000
}
fn default_nprobe() -> usize {
    10
}
fn default_kmeans_iterations() -> usize {
    20
}
fn default_seed() -> u64 {
    42
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_top_k() -> usize {
    10
}
fn default_cache_capacity() -> usize {
    128
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Number of batches embedded at once during an index build.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_concurrency() -> usize {
    1
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_generation_model(),
            base_url: default_generation_base_url(),
            api_key_env: default_api_key_env(),
            max_context_tokens: default_max_context_tokens(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_generation_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_generation_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_api_key_env() -> String {
    "GOOGLE_AI_STUDIO_API_KEY".to_string()
}
fn default_max_context_tokens() -> usize {
    32_768
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_output_tokens() -> u32 {
    8192
}
fn default_generation_timeout_secs() -> u64 {
    120
}

impl Config {
    /// Fully defaulted configuration for commands run without a config file.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Path of the persisted vector index.
    pub fn index_path(&self) -> PathBuf {
        self.data.index_dir.join("vectors.idx")
    }

    /// Path of the persisted corpus.
    pub fn corpus_path(&self) -> PathBuf {
        self.data.index_dir.join("documents.json")
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Ok(Config::minimal())
    }
}

pub fn validate(config: &Config) -> Result<()> {
    if config.tracker.extensions.is_empty() {
        anyhow::bail!("tracker.extensions must list at least one extension");
    }

    // Validate index
    if config.index.max_clusters == 0 {
        anyhow::bail!("index.max_clusters must be >= 1");
    }
    if config.index.max_training_samples == 0 {
        anyhow::bail!("index.max_training_samples must be >= 1");
    }
    if config.index.nprobe == 0 {
        anyhow::bail!("index.nprobe must be >= 1");
    }

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.cache_capacity == 0 {
        anyhow::bail!("retrieval.cache_capacity must be >= 1");
    }

    // Validate embedding
    if config.embedding.batch_size == 0 || config.embedding.concurrency == 0 {
        anyhow::bail!("embedding.batch_size and embedding.concurrency must be >= 1");
    }
    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "disabled" | "gemini" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled or gemini.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.retrieval.top_k, 10);
        assert_eq!(config.index.nprobe, 10);
        assert_eq!(config.index.max_clusters, 100);
        assert_eq!(config.index.max_training_samples, 10_000);
        assert_eq!(config.generation.max_context_tokens, 32_768);
        assert!(!config.embedding.is_enabled());
        validate(&config).unwrap();
    }

    #[test]
    fn remote_embedder_requires_dims() {
        let config: Config = toml::from_str(
            r#"
            [embedding]
            provider = "openai"
            model = "text-embedding-3-small"
            "#,
        )
        .unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn rejects_zero_top_k() {
        let config: Config = toml::from_str("[retrieval]\ntop_k = 0\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = load_config_or_default(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.retrieval.cache_capacity, 128);
        assert!(load_config(&tmp.path().join("absent.toml")).is_err());
    }

    #[test]
    fn rejects_unknown_generation_provider() {
        let config: Config = toml::from_str("[generation]\nprovider = \"gpt\"\n").unwrap();
        assert!(validate(&config).is_err());
    }
}

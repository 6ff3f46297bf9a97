//! Configuration types for the mnemo engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the mnemo engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MnemoConfig {
    /// Directory holding the index database (WAL files alongside).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Root directory for the tree memory facade.
    #[serde(default = "default_memory_root")]
    pub memory_root: PathBuf,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Search configuration.
    #[serde(default)]
    pub search: SearchConfig,

    /// Watcher configuration.
    #[serde(default)]
    pub watcher: WatcherConfig,
}

impl Default for MnemoConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            memory_root: default_memory_root(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            watcher: WatcherConfig::default(),
        }
    }
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding model name or URI (e.g. "hf:owner/repo/model.gguf").
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension; the vector table is created at this width.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Optional cross-encoder reranker model name or URI.
    #[serde(default)]
    pub rerank_model: Option<String>,

    /// Model load timeout in seconds.
    #[serde(default = "default_load_timeout")]
    pub load_timeout_secs: u64,

    /// Local directories searched for model files before remote resolution.
    #[serde(default = "default_model_search_paths")]
    pub search_paths: Vec<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_dimension(),
            rerank_model: None,
            load_timeout_secs: default_load_timeout(),
            search_paths: default_model_search_paths(),
        }
    }
}

/// Search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default number of results.
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Maximum number of results.
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    /// RRF constant k.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,

    /// RRF weight for the BM25 source.
    #[serde(default = "default_weight")]
    pub bm25_weight: f32,

    /// RRF weight for the vector source.
    #[serde(default = "default_weight")]
    pub vec_weight: f32,

    /// Content preview truncation in bytes for result content fields.
    #[serde(default = "default_preview_bytes")]
    pub preview_bytes: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            rrf_k: default_rrf_k(),
            bm25_weight: default_weight(),
            vec_weight: default_weight(),
            preview_bytes: default_preview_bytes(),
        }
    }
}

/// Watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Rescan interval in seconds.
    #[serde(default = "default_scan_interval")]
    pub interval_secs: u64,

    /// Per-event debounce in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Write-settled detection threshold in milliseconds.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_scan_interval(),
            debounce_ms: default_debounce_ms(),
            settle_ms: default_settle_ms(),
        }
    }
}

// Default value functions

fn default_embedding_model() -> String {
    "hf:nomic-ai/nomic-embed-text-v1.5-GGUF/nomic-embed-text-v1.5.f16.gguf".to_string()
}

fn default_dimension() -> usize {
    768
}

fn default_load_timeout() -> u64 {
    300
}

fn default_limit() -> usize {
    10
}

fn default_max_limit() -> usize {
    100
}

fn default_rrf_k() -> f32 {
    60.0
}

fn default_weight() -> f32 {
    1.0
}

fn default_preview_bytes() -> usize {
    500
}

fn default_scan_interval() -> u64 {
    60
}

fn default_debounce_ms() -> u64 {
    2000
}

fn default_settle_ms() -> u64 {
    1000
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mnemo")
}

fn default_memory_root() -> PathBuf {
    default_data_dir().join("memory")
}

fn default_model_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(data) = dirs::data_local_dir() {
        paths.push(data.join("mnemo").join("models"));
    }
    if let Some(cache) = dirs::cache_dir() {
        paths.push(cache.join("mnemo").join("models"));
    }
    paths
}

impl MnemoConfig {
    /// Create a configuration rooted at a specific data directory.
    ///
    /// The memory root defaults to `<data_dir>/memory`.
    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            memory_root: data_dir.join("memory"),
            data_dir,
            ..Self::default()
        }
    }

    /// Load configuration from file.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            crate::error::MnemoError::config(format!("Failed to parse config: {}", e))
        })?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> crate::error::Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("mnemo").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("mnemo.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }
}

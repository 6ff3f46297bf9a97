//! Trait seams for the neural runtimes.
//!
//! The embedding and reranker runtimes are external collaborators; the
//! engine only depends on these interfaces. Backends are constructed through
//! a [`BackendFactory`] after model file resolution, which keeps the model
//! lifecycle (single-flight load, unload, timeout) independent of any
//! particular inference runtime.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// A loaded embedding model context.
///
/// Implementations are invoked one context-call at a time; the engine never
/// issues concurrent `embed` calls against a single backend.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a batch of already-formatted texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// The embedding dimension.
    fn dimension(&self) -> usize;
}

/// A loaded cross-encoder reranker context.
#[async_trait]
pub trait RerankBackend: Send + Sync {
    /// Score each document against the query; higher is more relevant.
    async fn rank(&self, query: &str, docs: &[String]) -> Result<Vec<f32>>;
}

/// Resolves a model name or URI (e.g. `hf:owner/repo/file.gguf`) to a local
/// file path, fetching it if necessary.
pub trait ModelResolver: Send + Sync {
    fn resolve(&self, model: &str) -> Result<PathBuf>;
}

/// Constructs backend contexts from resolved model files.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Load an embedding context from a model file.
    async fn load_embedder(
        &self,
        model_path: &Path,
        dimension: usize,
    ) -> Result<Arc<dyn EmbeddingBackend>>;

    /// Load a reranker context from a model file.
    async fn load_reranker(&self, model_path: &Path) -> Result<Arc<dyn RerankBackend>>;
}

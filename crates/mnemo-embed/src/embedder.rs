//! Embedding and reranker model lifecycle.
//!
//! Model loads are single-flight: the first caller resolves the model file
//! and constructs the backend while concurrent callers await the same load.
//! A failed or timed-out load leaves the slot empty so the next caller can
//! retry. Batch embedding is sequential; the underlying runtime is driven
//! one context-call at a time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use mnemo_core::{
    BackendFactory, EmbeddingBackend, MnemoError, ModelResolver, RerankBackend, Result,
};

/// Format a query for embedding.
///
/// This string is part of the on-disk vector contract; changing it
/// invalidates all stored vectors.
pub fn format_query(text: &str) -> String {
    format!("task: search result | query: {}", text)
}

/// Format a document for embedding. Same contract caveat as
/// [`format_query`].
pub fn format_document(text: &str) -> String {
    format!("title: none | text: {}", text)
}

/// Owns the embedding and reranker model slots.
pub struct Embedder {
    factory: Arc<dyn BackendFactory>,
    resolver: Arc<dyn ModelResolver>,

    model: Mutex<String>,
    dimension: AtomicUsize,
    rerank_model: Mutex<Option<String>>,

    embed_slot: Mutex<Option<Arc<dyn EmbeddingBackend>>>,
    embed_flight: AsyncMutex<()>,
    rerank_slot: Mutex<Option<Arc<dyn RerankBackend>>>,
    rerank_flight: AsyncMutex<()>,
}

impl Embedder {
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        resolver: Arc<dyn ModelResolver>,
        model: String,
        dimension: usize,
        rerank_model: Option<String>,
    ) -> Self {
        Self {
            factory,
            resolver,
            model: Mutex::new(model),
            dimension: AtomicUsize::new(dimension),
            rerank_model: Mutex::new(rerank_model),
            embed_slot: Mutex::new(None),
            embed_flight: AsyncMutex::new(()),
            rerank_slot: Mutex::new(None),
            rerank_flight: AsyncMutex::new(()),
        }
    }

    /// The configured embedding model name.
    pub fn model_name(&self) -> String {
        self.model.lock().unwrap().clone()
    }

    /// The configured embedding dimension.
    pub fn dimension(&self) -> usize {
        self.dimension.load(Ordering::SeqCst)
    }

    /// The configured reranker model name, if any.
    pub fn rerank_model_name(&self) -> Option<String> {
        self.rerank_model.lock().unwrap().clone()
    }

    /// Whether the embedding context is currently loaded.
    pub fn is_embedder_loaded(&self) -> bool {
        self.embed_slot.lock().unwrap().is_some()
    }

    /// Whether the reranker context is currently loaded.
    pub fn is_reranker_loaded(&self) -> bool {
        self.rerank_slot.lock().unwrap().is_some()
    }

    /// Switch the embedding model. Unloads any live context; the caller is
    /// responsible for resizing the vector table to `dimension`.
    pub fn set_model(&self, model: &str, dimension: usize) {
        *self.model.lock().unwrap() = model.to_string();
        self.dimension.store(dimension, Ordering::SeqCst);
        *self.embed_slot.lock().unwrap() = None;
        info!("Embedding model set to {} (dim {})", model, dimension);
    }

    /// Get or load the embedding backend, single-flight.
    pub async fn ensure_embedder(&self) -> Result<Arc<dyn EmbeddingBackend>> {
        if let Some(backend) = self.embed_slot.lock().unwrap().clone() {
            return Ok(backend);
        }

        // One loader at a time; losers park here and re-check the slot
        let _flight = self.embed_flight.lock().await;
        if let Some(backend) = self.embed_slot.lock().unwrap().clone() {
            return Ok(backend);
        }

        let model = self.model_name();
        debug!("Loading embedding model {}", model);
        let path = self.resolver.resolve(&model)?;
        let backend = self.factory.load_embedder(&path, self.dimension()).await?;

        *self.embed_slot.lock().unwrap() = Some(backend.clone());
        info!("Embedding model {} loaded", model);
        Ok(backend)
    }

    /// Get or load the reranker backend, single-flight.
    pub async fn ensure_reranker(&self) -> Result<Arc<dyn RerankBackend>> {
        if let Some(backend) = self.rerank_slot.lock().unwrap().clone() {
            return Ok(backend);
        }

        let _flight = self.rerank_flight.lock().await;
        if let Some(backend) = self.rerank_slot.lock().unwrap().clone() {
            return Ok(backend);
        }

        let Some(model) = self.rerank_model_name() else {
            return Err(MnemoError::ModelUnavailable {
                model: "(reranker)".to_string(),
                reason: "no reranker model configured".to_string(),
            });
        };

        debug!("Loading reranker model {}", model);
        let path = self.resolver.resolve(&model)?;
        let backend = self.factory.load_reranker(&path).await?;

        *self.rerank_slot.lock().unwrap() = Some(backend.clone());
        info!("Reranker model {} loaded", model);
        Ok(backend)
    }

    /// Embed a query with the query formatting contract.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let backend = self.ensure_embedder().await?;
        let mut vectors = backend.embed(&[format_query(text)]).await?;
        vectors
            .pop()
            .ok_or_else(|| MnemoError::embedding("backend returned no embedding"))
    }

    /// Embed a document with the document formatting contract.
    pub async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        let backend = self.ensure_embedder().await?;
        let mut vectors = backend.embed(&[format_document(text)]).await?;
        vectors
            .pop()
            .ok_or_else(|| MnemoError::embedding("backend returned no embedding"))
    }

    /// Embed documents one at a time; a per-item failure yields `None` and
    /// the batch continues.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        let backend = self.ensure_embedder().await?;
        let mut out = Vec::with_capacity(texts.len());

        for text in texts {
            match backend.embed(&[format_document(text)]).await {
                Ok(mut vectors) => out.push(vectors.pop()),
                Err(e) => {
                    warn!("Batch item failed to embed: {}", e);
                    out.push(None);
                }
            }
        }

        Ok(out)
    }

    /// Score documents against a query with the loaded reranker.
    pub async fn rank(&self, query: &str, docs: &[String]) -> Result<Vec<f32>> {
        let backend = self.ensure_reranker().await?;
        backend.rank(query, docs).await
    }

    /// Drop both model contexts. The factory handle is retained, so a later
    /// call can reload.
    pub fn unload(&self) {
        *self.embed_slot.lock().unwrap() = None;
        *self.rerank_slot.lock().unwrap() = None;
        debug!("Model contexts unloaded");
    }
}

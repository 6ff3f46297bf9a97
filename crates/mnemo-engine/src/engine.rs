//! The engine facade: one public entry point composing the store, indexer,
//! searcher, embedder, watcher, and memory tree.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use mnemo_core::{
    BackendFactory, Collection, Document, EmbeddingStatus, IndexReport, MnemoConfig, MnemoError,
    ModelResolver, PendingEmbedding, Result, SearchHit,
};
use mnemo_embed::{Embedder, LocalResolver};
use mnemo_index::{Collections, Indexer};
use mnemo_search::{RerankFn, RrfWeights, SearchOptions, Searcher};
use mnemo_store::Store;
use mnemo_tree::MemoryTree;
use mnemo_watch::{embed_pass, AutoEmbedWatcher};

/// Collection name backing the memory tree.
pub const MEMORY_COLLECTION: &str = "memory";

/// Parameters for `search` and `vsearch`.
#[derive(Clone, Default)]
pub struct SearchParams {
    /// Restrict to one collection.
    pub collection: Option<String>,

    /// Maximum results; the configured default applies when absent.
    pub limit: Option<usize>,

    /// Minimum score; defaults to 0.
    pub min_score: Option<f32>,

    /// Force hybrid on or off. When absent, hybrid is used only while an
    /// embedding model is loaded.
    pub use_hybrid: Option<bool>,
}

/// Parameters for the full `query` pipeline.
#[derive(Clone, Default)]
pub struct QueryParams {
    pub collection: Option<String>,
    pub limit: Option<usize>,
    pub min_score: Option<f32>,

    /// External rerank callback.
    pub rerank: Option<RerankFn>,

    /// `(bm25, vec)` fusion weight override.
    pub weights: Option<(f32, f32)>,
}

struct Inner {
    store: Arc<Store>,
    collections: Collections,
    indexer: Arc<Indexer>,
    searcher: Arc<Searcher>,
    embedder: Arc<Embedder>,
    watcher: Arc<AutoEmbedWatcher>,
    memory: Arc<MemoryTree>,
}

/// The mnemo engine.
pub struct Engine {
    config: MnemoConfig,
    factory: Arc<dyn BackendFactory>,
    resolver: Arc<dyn ModelResolver>,
    inner: AsyncMutex<Option<Arc<Inner>>>,
}

impl Engine {
    /// Create an engine. Nothing is opened until [`Engine::initialize`].
    pub fn new(config: MnemoConfig, factory: Arc<dyn BackendFactory>) -> Self {
        let resolver = Arc::new(LocalResolver::new(config.embedding.search_paths.clone()));
        Self::with_resolver(config, factory, resolver)
    }

    /// Create an engine with a custom model resolver.
    pub fn with_resolver(
        config: MnemoConfig,
        factory: Arc<dyn BackendFactory>,
        resolver: Arc<dyn ModelResolver>,
    ) -> Self {
        Self {
            config,
            factory,
            resolver,
            inner: AsyncMutex::new(None),
        }
    }

    /// Open the store and build every component. Idempotent: a second call
    /// is a no-op.
    pub async fn initialize(&self) -> Result<()> {
        let mut slot = self.inner.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        let store = Arc::new(Store::open(
            &self.config.data_dir,
            self.config.embedding.dimension,
        )?);

        let collections = Collections::new(store.clone());
        let indexer = Arc::new(Indexer::new(store.clone()));

        let embedder = Arc::new(Embedder::new(
            self.factory.clone(),
            self.resolver.clone(),
            self.config.embedding.model.clone(),
            self.config.embedding.dimension,
            self.config.embedding.rerank_model.clone(),
        ));

        let weights = RrfWeights {
            k: self.config.search.rrf_k,
            bm25: self.config.search.bm25_weight,
            vec: self.config.search.vec_weight,
        };
        let searcher = Arc::new(Searcher::new(store.clone(), embedder.clone(), weights));

        let watcher = Arc::new(AutoEmbedWatcher::new(
            store.clone(),
            indexer.clone(),
            embedder.clone(),
            self.config.watcher.clone(),
        ));

        // The memory tree rides on its own collection, registered lazily on
        // the first write so unused deployments do not list it
        let memory = Arc::new(MemoryTree::new(
            self.config.memory_root.clone(),
            MEMORY_COLLECTION.to_string(),
            store.clone(),
            indexer.clone(),
            embedder.clone(),
            searcher.clone(),
        )?);

        *slot = Some(Arc::new(Inner {
            store,
            collections,
            indexer,
            searcher,
            embedder,
            watcher,
            memory,
        }));

        info!("Engine initialized at {:?}", self.config.data_dir);
        Ok(())
    }

    async fn inner(&self) -> Result<Arc<Inner>> {
        self.inner
            .lock()
            .await
            .clone()
            .ok_or_else(|| MnemoError::internal("engine not initialized"))
    }

    /// Stop the watcher, unload models, and close the database, in that
    /// order. Every step runs even when an earlier one fails.
    pub async fn close(&self) -> Result<()> {
        let mut slot = self.inner.lock().await;
        let Some(inner) = slot.take() else {
            return Ok(());
        };

        inner.watcher.stop();
        inner.embedder.unload();
        let result = inner.store.close();

        info!("Engine closed");
        result
    }

    // Collections

    pub async fn add_collection(
        &self,
        name: &str,
        path: &Path,
        glob: Option<&str>,
    ) -> Result<Collection> {
        self.inner().await?.collections.add(name, path, glob).await
    }

    pub async fn list_collections(&self) -> Result<Vec<Collection>> {
        self.inner().await?.collections.list().await
    }

    pub async fn get_collection(&self, name: &str) -> Result<Option<Collection>> {
        self.inner().await?.collections.get(name).await
    }

    pub async fn remove_collection(&self, name: &str) -> Result<()> {
        self.inner().await?.collections.remove(name).await
    }

    /// Reindex every collection.
    pub async fn reindex(&self, incremental: bool) -> Result<IndexReport> {
        self.inner().await?.indexer.reindex(incremental).await
    }

    // Search

    /// Search with the facade default: hybrid while a model is loaded,
    /// BM25-only otherwise. `use_hybrid` overrides in both directions.
    pub async fn search(&self, query: &str, params: &SearchParams) -> Result<Vec<SearchHit>> {
        let inner = self.inner().await?;
        let opts = self.search_options(params);

        let hybrid = params
            .use_hybrid
            .unwrap_or_else(|| inner.embedder.is_embedder_loaded());

        let mut hits = if hybrid {
            let embedding = match inner.embedder.embed_query(query).await {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Query embedding unavailable, using lexical only: {}", e);
                    None
                }
            };
            inner
                .searcher
                .hybrid(query, embedding.as_deref(), &opts)
                .await?
        } else {
            inner.searcher.search_bm25(query, &opts).await?
        };

        self.truncate_previews(&mut hits);
        Ok(hits)
    }

    /// ANN-only search over a caller-supplied embedding.
    pub async fn vsearch(&self, embedding: &[f32], params: &SearchParams) -> Result<Vec<SearchHit>> {
        let inner = self.inner().await?;
        let opts = self.search_options(params);
        let mut hits = inner.searcher.search_vec(embedding, &opts).await?;
        self.truncate_previews(&mut hits);
        Ok(hits)
    }

    /// The full hybrid pipeline with optional caller-supplied embedding,
    /// rerank callback, and fusion weights.
    pub async fn query(
        &self,
        text: &str,
        embedding: Option<Vec<f32>>,
        params: &QueryParams,
    ) -> Result<Vec<SearchHit>> {
        let inner = self.inner().await?;

        let opts = SearchOptions {
            collection: params.collection.clone(),
            limit: self.effective_limit(params.limit),
            min_score: params.min_score.unwrap_or(0.0),
            rerank: params.rerank.clone(),
            weights: params.weights.map(|(bm25, vec)| RrfWeights {
                k: self.config.search.rrf_k,
                bm25,
                vec,
            }),
        };

        let embedding = match embedding {
            Some(v) => Some(v),
            None if inner.embedder.is_embedder_loaded() => {
                inner.embedder.embed_query(text).await.ok()
            }
            None => None,
        };

        let mut hits = inner
            .searcher
            .hybrid(text, embedding.as_deref(), &opts)
            .await?;
        self.truncate_previews(&mut hits);
        Ok(hits)
    }

    /// Fetch a document (and its body) by relative path.
    pub async fn get(&self, path: &str) -> Result<Option<(Document, String)>> {
        self.inner().await?.store.get_document_by_path(path).await
    }

    // Embedding management

    pub async fn get_hashes_for_embedding(&self) -> Result<Vec<PendingEmbedding>> {
        self.inner().await?.store.hashes_for_embedding().await
    }

    pub async fn insert_embedding(
        &self,
        content_hash: &str,
        seq: u32,
        pos: u32,
        vector: &[f32],
    ) -> Result<()> {
        let inner = self.inner().await?;
        let model = inner.embedder.model_name();
        inner
            .store
            .insert_embedding(content_hash, seq, pos, &model, vector)
            .await
    }

    pub async fn clear_all_embeddings(&self) -> Result<()> {
        self.inner().await?.store.clear_all_embeddings().await
    }

    pub async fn embedding_status(&self) -> Result<EmbeddingStatus> {
        self.inner().await?.store.embedding_status().await
    }

    /// Embed a query string with the loaded model.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.inner().await?.embedder.embed_query(text).await
    }

    /// Embed a document string with the loaded model.
    pub async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.inner().await?.embedder.embed_document(text).await
    }

    /// Embed a batch of documents sequentially; failed items are `None`.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        self.inner().await?.embedder.embed_batch(texts).await
    }

    /// Embed every pending content hash now; returns how many vectors were
    /// written.
    pub async fn embed_all(&self) -> Result<usize> {
        let inner = self.inner().await?;
        embed_pass(&inner.store, &inner.embedder).await
    }

    /// Switch the embedding model, resizing the vector table. Stored
    /// vectors are dropped when the dimension changes; lexical data stays.
    pub async fn set_embedding_model(&self, model: &str, dimension: usize) -> Result<()> {
        let inner = self.inner().await?;
        inner.embedder.set_model(model, dimension);
        inner.store.ensure_vec_table(dimension).await?;
        inner.store.set_model_name(model).await
    }

    pub async fn get_embedding_model(&self) -> Result<String> {
        Ok(self.inner().await?.embedder.model_name())
    }

    pub async fn get_embedding_dimension(&self) -> Result<usize> {
        Ok(self.inner().await?.embedder.dimension())
    }

    /// Load the embedding model now, bounded by the configured timeout.
    pub async fn preload_embedding_model(&self) -> Result<()> {
        let inner = self.inner().await?;
        let seconds = self.config.embedding.load_timeout_secs;

        match tokio::time::timeout(
            Duration::from_secs(seconds),
            inner.embedder.ensure_embedder(),
        )
        .await
        {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(MnemoError::ModelLoadTimeout {
                model: inner.embedder.model_name(),
                seconds,
            }),
        }
    }

    /// Load the reranker model now, bounded by the configured timeout.
    pub async fn preload_rerank_model(&self) -> Result<()> {
        let inner = self.inner().await?;
        let seconds = self.config.embedding.load_timeout_secs;

        match tokio::time::timeout(
            Duration::from_secs(seconds),
            inner.embedder.ensure_reranker(),
        )
        .await
        {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(MnemoError::ModelLoadTimeout {
                model: inner
                    .embedder
                    .rerank_model_name()
                    .unwrap_or_else(|| "(reranker)".to_string()),
                seconds,
            }),
        }
    }

    pub async fn is_embedding_model_loaded(&self) -> Result<bool> {
        Ok(self.inner().await?.embedder.is_embedder_loaded())
    }

    pub async fn is_rerank_model_loaded(&self) -> Result<bool> {
        Ok(self.inner().await?.embedder.is_reranker_loaded())
    }

    // Watcher

    /// Start the auto-embed watcher. Starting twice is a warning no-op.
    pub async fn start_auto_embed(&self) -> Result<()> {
        self.inner().await?.watcher.start().await
    }

    /// Stop the auto-embed watcher; idempotent.
    pub async fn stop_auto_embed(&self) -> Result<()> {
        self.inner().await?.watcher.stop();
        Ok(())
    }

    // Memory facade

    /// The tree memory facade.
    pub async fn memory(&self) -> Result<Arc<MemoryTree>> {
        Ok(self.inner().await?.memory.clone())
    }

    fn search_options(&self, params: &SearchParams) -> SearchOptions {
        SearchOptions {
            collection: params.collection.clone(),
            limit: self.effective_limit(params.limit),
            min_score: params.min_score.unwrap_or(0.0),
            rerank: None,
            weights: None,
        }
    }

    // An explicit limit of 0 is honored: callers get an empty result set
    fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.config.search.default_limit)
            .min(self.config.search.max_limit)
    }

    fn truncate_previews(&self, hits: &mut [SearchHit]) {
        let max = self.config.search.preview_bytes;
        for hit in hits {
            hit.content = truncate_on_char_boundary(&hit.content, max);
        }
    }
}

/// Truncate to at most `max_bytes`, never splitting a UTF-8 character.
fn truncate_on_char_boundary(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate_on_char_boundary("short", 500), "short");
        assert_eq!(truncate_on_char_boundary("abcdef", 3), "abc");
        // Multi-byte characters never split
        let s = "aé中";
        for max in 0..=s.len() {
            let t = truncate_on_char_boundary(s, max);
            assert!(t.len() <= max);
            assert!(s.starts_with(&t));
        }
    }
}

//! Deterministic mock backends for testing without model files.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use mnemo_core::{
    BackendFactory, EmbeddingBackend, MnemoError, ModelResolver, RerankBackend, Result,
};

/// A mock embedding backend producing hash-seeded, L2-normalized vectors.
///
/// The same input always maps to the same vector, and different inputs map
/// to different vectors, which is all hybrid-search tests need.
pub struct MockBackend {
    dimension: usize,
}

impl MockBackend {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingBackend for MockBackend {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let hash = text
                    .bytes()
                    .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
                let mut embedding = vec![0.0f32; self.dimension];
                for (i, v) in embedding.iter_mut().enumerate() {
                    *v = ((hash.wrapping_mul(i as u64 + 1)) as f32 % 1000.0) / 1000.0 - 0.5;
                }
                let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for x in &mut embedding {
                        *x /= norm;
                    }
                }
                embedding
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// A mock reranker scoring by lowercase term overlap with the query.
pub struct MockReranker;

#[async_trait]
impl RerankBackend for MockReranker {
    async fn rank(&self, query: &str, docs: &[String]) -> Result<Vec<f32>> {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        Ok(docs
            .iter()
            .map(|doc| {
                if terms.is_empty() {
                    return 0.0;
                }
                let lower = doc.to_lowercase();
                let matched = terms.iter().filter(|t| lower.contains(t.as_str())).count();
                matched as f32 / terms.len() as f32
            })
            .collect())
    }
}

/// Factory constructing mock backends; counts loads for lifecycle tests.
pub struct MockFactory {
    dimension: usize,
    embed_loads: AtomicUsize,
    rerank_loads: AtomicUsize,
}

impl MockFactory {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            embed_loads: AtomicUsize::new(0),
            rerank_loads: AtomicUsize::new(0),
        }
    }

    /// How many embedding contexts this factory has constructed.
    pub fn embed_loads(&self) -> usize {
        self.embed_loads.load(Ordering::SeqCst)
    }

    /// How many reranker contexts this factory has constructed.
    pub fn rerank_loads(&self) -> usize {
        self.rerank_loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendFactory for MockFactory {
    async fn load_embedder(
        &self,
        _model_path: &Path,
        dimension: usize,
    ) -> Result<Arc<dyn EmbeddingBackend>> {
        self.embed_loads.fetch_add(1, Ordering::SeqCst);
        let dim = if dimension > 0 { dimension } else { self.dimension };
        Ok(Arc::new(MockBackend::new(dim)))
    }

    async fn load_reranker(&self, _model_path: &Path) -> Result<Arc<dyn RerankBackend>> {
        self.rerank_loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockReranker))
    }
}

/// Resolver that maps every model name to a fixed dummy path.
pub struct StaticResolver;

impl ModelResolver for StaticResolver {
    fn resolve(&self, _model: &str) -> Result<PathBuf> {
        Ok(PathBuf::from("/dev/null"))
    }
}

/// Factory whose loads fail a configurable number of times before
/// succeeding; used to test that a failed load clears the slot.
pub struct FlakyFactory {
    inner: MockFactory,
    failures_left: AtomicUsize,
}

impl FlakyFactory {
    pub fn new(dimension: usize, failures: usize) -> Self {
        Self {
            inner: MockFactory::new(dimension),
            failures_left: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl BackendFactory for FlakyFactory {
    async fn load_embedder(
        &self,
        model_path: &Path,
        dimension: usize,
    ) -> Result<Arc<dyn EmbeddingBackend>> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(MnemoError::embedding("transient load failure"));
        }
        self.inner.load_embedder(model_path, dimension).await
    }

    async fn load_reranker(&self, model_path: &Path) -> Result<Arc<dyn RerankBackend>> {
        self.inner.load_reranker(model_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_backend_deterministic_and_normalized() {
        let backend = MockBackend::new(768);

        let a = backend.embed(&["hello".to_string()]).await.unwrap();
        let b = backend.embed(&["hello".to_string()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 768);

        let norm: f32 = a[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);

        let c = backend.embed(&["world".to_string()]).await.unwrap();
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_mock_reranker_prefers_overlap() {
        let reranker = MockReranker;
        let scores = reranker
            .rank(
                "rust language",
                &[
                    "the rust language book".to_string(),
                    "cooking pasta".to_string(),
                ],
            )
            .await
            .unwrap();
        assert!(scores[0] > scores[1]);
    }
}

//! The hybrid query pipeline.
//!
//! BM25 and ANN retrieval fan out in parallel, fuse with RRF, and pass
//! through the first applicable rerank strategy. Vector-side failures
//! degrade to lexical-only results; they never fail a query.

use std::sync::Arc;

use tracing::{debug, warn};

use mnemo_core::{RankSource, Result, SearchHit};
use mnemo_embed::Embedder;
use mnemo_store::{Store, StoreHit};

use crate::fusion::{reciprocal_rank_fusion, sort_candidates, Candidate, RrfWeights};
use crate::rerank::{blend_external, cosine_similarity, keyword_rerank};

/// Both retrieval sides and the rerank stage over-fetch by this factor.
const OVERFETCH: usize = 4;

/// External rerank callback: `(query, bodies) -> scores`.
pub type RerankFn = Arc<dyn Fn(&str, &[String]) -> Vec<f32> + Send + Sync>;

/// Options for a search call.
#[derive(Clone)]
pub struct SearchOptions {
    /// Restrict to one collection.
    pub collection: Option<String>,

    /// Maximum results returned.
    pub limit: usize,

    /// Drop results scoring below this.
    pub min_score: f32,

    /// External rerank callback, blended `0.4 * rrf + 0.6 * rerank`.
    pub rerank: Option<RerankFn>,

    /// Per-call fusion weight override.
    pub weights: Option<RrfWeights>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            collection: None,
            limit: 10,
            min_score: 0.0,
            rerank: None,
            weights: None,
        }
    }
}

/// Runs hybrid queries against the store.
pub struct Searcher {
    store: Arc<Store>,
    embedder: Arc<Embedder>,
    weights: RrfWeights,
}

impl Searcher {
    pub fn new(store: Arc<Store>, embedder: Arc<Embedder>, weights: RrfWeights) -> Self {
        Self {
            store,
            embedder,
            weights,
        }
    }

    /// BM25-only search.
    pub async fn search_bm25(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let hits = self
            .store
            .bm25(query, opts.collection.as_deref(), opts.limit)
            .await?;
        Ok(finalize(hits, RankSource::Bm25, opts.limit, opts.min_score))
    }

    /// ANN-only search over a caller-supplied embedding.
    pub async fn search_vec(
        &self,
        embedding: &[f32],
        opts: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let hits = self
            .store
            .vec_search(embedding, opts.collection.as_deref(), opts.limit)
            .await?;
        Ok(finalize(hits, RankSource::Vec, opts.limit, opts.min_score))
    }

    /// The full hybrid pipeline.
    ///
    /// When exactly one side returns results, that side's top `limit` is
    /// returned directly; fusion and reranking only run when both sides
    /// contribute.
    pub async fn hybrid(
        &self,
        query: &str,
        embedding: Option<&[f32]>,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let fetch = opts.limit * OVERFETCH;
        let collection = opts.collection.as_deref();

        let bm25_fut = self.store.bm25(query, collection, fetch);
        let vec_fut = async {
            match embedding {
                Some(emb) => match self.store.vec_search(emb, collection, fetch).await {
                    Ok(hits) => hits,
                    Err(e) => {
                        warn!("Vector search failed, degrading to lexical: {}", e);
                        Vec::new()
                    }
                },
                None => Vec::new(),
            }
        };

        let (bm25_hits, vec_hits) = tokio::join!(bm25_fut, vec_fut);
        let bm25_hits = bm25_hits?;

        debug!(
            "Retrieval: {} bm25, {} vec for {:?}",
            bm25_hits.len(),
            vec_hits.len(),
            query
        );

        match (bm25_hits.is_empty(), vec_hits.is_empty()) {
            (true, true) => return Ok(Vec::new()),
            (false, true) => {
                return Ok(finalize(
                    bm25_hits,
                    RankSource::Bm25,
                    opts.limit,
                    opts.min_score,
                ))
            }
            (true, false) => {
                return Ok(finalize(
                    vec_hits,
                    RankSource::Vec,
                    opts.limit,
                    opts.min_score,
                ))
            }
            (false, false) => {}
        }

        let weights = opts.weights.unwrap_or(self.weights);
        let mut candidates = reciprocal_rank_fusion(bm25_hits, vec_hits, &weights);
        candidates.truncate(opts.limit * OVERFETCH);

        self.rerank(query, embedding, opts, &mut candidates).await;

        sort_candidates(&mut candidates);
        let hits: Vec<StoreHit> = candidates
            .into_iter()
            .map(|c| {
                let mut hit = c.hit;
                hit.score = c.score;
                hit
            })
            .collect();

        Ok(finalize(
            hits,
            RankSource::Hybrid,
            opts.limit,
            opts.min_score,
        ))
    }

    /// Apply the first applicable rerank strategy in place.
    async fn rerank(
        &self,
        query: &str,
        embedding: Option<&[f32]>,
        opts: &SearchOptions,
        candidates: &mut [Candidate],
    ) {
        // Cross-encoder: scores become the final ranking
        if self.embedder.is_reranker_loaded() {
            let bodies: Vec<String> = candidates.iter().map(|c| c.hit.body.clone()).collect();
            match self.embedder.rank(query, &bodies).await {
                Ok(scores) if scores.len() == candidates.len() => {
                    for (candidate, score) in candidates.iter_mut().zip(scores) {
                        candidate.score = score;
                    }
                    return;
                }
                Ok(_) => warn!("Reranker returned a mismatched score count"),
                Err(e) => warn!("Cross-encoder rerank failed: {}", e),
            }
        }

        // External callback: blended with the fused score
        if let Some(callback) = &opts.rerank {
            let bodies: Vec<String> = candidates.iter().map(|c| c.hit.body.clone()).collect();
            let scores = callback(query, &bodies);
            if scores.len() == candidates.len() {
                for (candidate, score) in candidates.iter_mut().zip(scores) {
                    candidate.score = blend_external(candidate.score, score);
                }
                return;
            }
            warn!("External rerank returned a mismatched score count");
        }

        // Embedding rerank: cosine against each document's seq=0 vector
        if let Some(query_emb) = embedding {
            let mut any = false;
            for candidate in candidates.iter_mut() {
                if let Ok(Some(doc_emb)) =
                    self.store.content_vector(&candidate.hit.content_hash, 0).await
                {
                    candidate.score = cosine_similarity(query_emb, &doc_emb);
                    any = true;
                }
            }
            if any {
                return;
            }
        }

        keyword_rerank(query, candidates);
    }
}

/// Convert store rows into public hits, enforcing limit and min_score.
fn finalize(
    hits: Vec<StoreHit>,
    source: RankSource,
    limit: usize,
    min_score: f32,
) -> Vec<SearchHit> {
    hits.into_iter()
        .filter(|h| h.score >= min_score)
        .take(limit)
        .map(|h| SearchHit {
            id: h.id,
            collection: h.collection,
            path: h.path,
            title: h.title,
            content: h.body,
            score: h.score,
            source,
            frontmatter: h.frontmatter,
            updated_at: h.updated_at,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_embed::mock::{MockFactory, StaticResolver};
    use serde_json::json;

    async fn searcher_with_docs() -> Searcher {
        let store = Arc::new(Store::open_memory(768).unwrap());
        let coll = store
            .add_collection("notes", std::path::Path::new("/tmp/n"), "**/*.md")
            .await
            .unwrap();

        let docs = [
            ("rust.md", "Rust Guide", "Rust is a systems programming language"),
            ("python.md", "Python Intro", "Python is an interpreted language"),
            ("pasta.md", "Pasta", "Boil water and cook the pasta"),
        ];
        for (path, title, body) in docs {
            store
                .upsert(coll.id, path, title, body, &json!({}))
                .await
                .unwrap();
        }

        let embedder = Arc::new(Embedder::new(
            Arc::new(MockFactory::new(768)),
            Arc::new(StaticResolver),
            "mock".to_string(),
            768,
            None,
        ));
        Searcher::new(store, embedder, RrfWeights::default())
    }

    #[tokio::test]
    async fn test_empty_query_returns_empty() {
        let searcher = searcher_with_docs().await;
        let opts = SearchOptions::default();

        assert!(searcher.hybrid("", None, &opts).await.unwrap().is_empty());
        assert!(searcher.hybrid("   ", None, &opts).await.unwrap().is_empty());
        assert!(searcher.search_bm25("", &opts).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hybrid_degrades_to_bm25_without_vectors() {
        let searcher = searcher_with_docs().await;
        let hits = searcher
            .hybrid("rust systems", None, &SearchOptions::default())
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "rust.md");
        assert_eq!(hits[0].source, RankSource::Bm25);
    }

    #[tokio::test]
    async fn test_limit_and_monotone_scores() {
        let searcher = searcher_with_docs().await;

        let all = searcher
            .hybrid("language", None, &SearchOptions::default())
            .await
            .unwrap();
        assert!(all.len() >= 2);
        for window in all.windows(2) {
            assert!(window[0].score >= window[1].score);
        }

        let one = searcher
            .hybrid(
                "language",
                None,
                &SearchOptions {
                    limit: 1,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].path, all[0].path);
    }

    #[tokio::test]
    async fn test_min_score_filter() {
        let searcher = searcher_with_docs().await;
        let hits = searcher
            .hybrid(
                "language",
                None,
                &SearchOptions {
                    min_score: 2.0,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_nonsense_query_returns_empty() {
        let searcher = searcher_with_docs().await;
        let hits = searcher
            .hybrid("zzzqqqxxx", None, &SearchOptions::default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_collection_filter() {
        let searcher = searcher_with_docs().await;
        let hits = searcher
            .hybrid(
                "language",
                None,
                &SearchOptions {
                    collection: Some("other".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(hits.is_empty(), "unknown collection matches nothing");
    }

    #[tokio::test]
    async fn test_vsearch_empty_without_extension() {
        let searcher = searcher_with_docs().await;
        let hits = searcher
            .search_vec(&vec![0.1f32; 768], &SearchOptions::default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}

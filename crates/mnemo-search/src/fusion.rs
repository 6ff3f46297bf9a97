//! Reciprocal Rank Fusion (RRF) for combining search results.

use std::collections::HashMap;

use mnemo_store::StoreHit;

/// RRF parameters. Higher `k` gives more weight to lower-ranked results.
#[derive(Debug, Clone, Copy)]
pub struct RrfWeights {
    /// RRF constant (commonly 60).
    pub k: f32,

    /// Weight of the BM25 source.
    pub bm25: f32,

    /// Weight of the vector source.
    pub vec: f32,
}

impl Default for RrfWeights {
    fn default() -> Self {
        Self {
            k: 60.0,
            bm25: 1.0,
            vec: 1.0,
        }
    }
}

/// A fused candidate awaiting reranking.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The underlying row; when a path appears in both sources, the BM25
    /// row is kept.
    pub hit: StoreHit,

    /// Fused score, normalized so the top candidate scores 1.0.
    pub score: f32,
}

/// Fuse BM25 and vector result lists with weighted RRF.
///
/// `rrf(p) = Σ_sources w_s / (k + rank_s(p))` keyed by `(collection, path)`;
/// paths appearing in both sources accumulate. Scores are normalized by the
/// maximum, and ties break by path ascending for deterministic ordering.
pub fn reciprocal_rank_fusion(
    bm25: Vec<StoreHit>,
    vec: Vec<StoreHit>,
    weights: &RrfWeights,
) -> Vec<Candidate> {
    let mut scores: HashMap<(String, String), f32> = HashMap::new();
    let mut hits: HashMap<(String, String), StoreHit> = HashMap::new();

    for (rank, hit) in bm25.into_iter().enumerate() {
        let key = (hit.collection.clone(), hit.path.clone());
        *scores.entry(key.clone()).or_default() += weights.bm25 / (weights.k + rank as f32 + 1.0);
        hits.entry(key).or_insert(hit);
    }

    for (rank, hit) in vec.into_iter().enumerate() {
        let key = (hit.collection.clone(), hit.path.clone());
        *scores.entry(key.clone()).or_default() += weights.vec / (weights.k + rank as f32 + 1.0);
        hits.entry(key).or_insert(hit);
    }

    let max = scores.values().copied().fold(0.0f32, f32::max);

    let mut fused: Vec<Candidate> = scores
        .into_iter()
        .filter_map(|(key, score)| {
            hits.remove(&key).map(|hit| Candidate {
                hit,
                score: if max > 0.0 { score / max } else { 0.0 },
            })
        })
        .collect();

    sort_candidates(&mut fused);
    fused
}

/// Sort candidates by score descending, then by path ascending.
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.hit.path.cmp(&b.hit.path))
    });
}

//! Reranking strategies applied after fusion.

use crate::fusion::Candidate;

/// Weight of the fused score when blending with an external rerank score.
const EXTERNAL_RRF_WEIGHT: f32 = 0.4;

/// Weight of the external rerank score.
const EXTERNAL_RERANK_WEIGHT: f32 = 0.6;

/// Weight of the original score in the keyword rerank blend.
const KEYWORD_ORIGINAL_WEIGHT: f32 = 0.3;

/// Weight of the keyword match fraction.
const KEYWORD_MATCH_WEIGHT: f32 = 0.7;

/// Bonus for a term occurring at a token boundary.
const BOUNDARY_BONUS: f32 = 0.5;

/// Cosine similarity between two vectors; 0.0 on dimension mismatch.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Blend a fused score with an external rerank score.
pub fn blend_external(rrf_score: f32, rerank_score: f32) -> f32 {
    EXTERNAL_RRF_WEIGHT * rrf_score + EXTERNAL_RERANK_WEIGHT * rerank_score
}

/// Query terms considered for keyword reranking: lowercase, length > 1.
pub fn keyword_terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .filter(|t| t.chars().count() > 1)
        .map(str::to_string)
        .collect()
}

/// Rescore candidates by keyword overlap.
///
/// Per term: +1 per occurrence in `title + body`, +0.5 once more when the
/// term sits at a token boundary. The final score blends the original:
/// `0.3 * original + 0.7 * (matches / |terms|)`.
pub fn keyword_rerank(query: &str, candidates: &mut [Candidate]) {
    let terms = keyword_terms(query);
    if terms.is_empty() {
        return;
    }

    for candidate in candidates.iter_mut() {
        let text = format!("{} {}", candidate.hit.title, candidate.hit.body).to_lowercase();

        let mut matches = 0.0f32;
        for term in &terms {
            let occurrences = count_occurrences(&text, term);
            matches += occurrences as f32;
            if has_boundary_match(&text, term) {
                matches += BOUNDARY_BONUS;
            }
        }

        candidate.score = KEYWORD_ORIGINAL_WEIGHT * candidate.score
            + KEYWORD_MATCH_WEIGHT * (matches / terms.len() as f32);
    }
}

fn count_occurrences(text: &str, term: &str) -> usize {
    if term.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut start = 0;
    while let Some(pos) = text[start..].find(term) {
        count += 1;
        start += pos + term.len();
    }
    count
}

/// Whether any occurrence of `term` is delimited by non-alphanumeric
/// characters (or the text edges) on both sides.
fn has_boundary_match(text: &str, term: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = text[start..].find(term) {
        let abs = start + pos;
        let before_ok = text[..abs]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = text[abs + term.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        start = abs + term.len();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_store::StoreHit;

    fn candidate(title: &str, body: &str, score: f32) -> Candidate {
        Candidate {
            hit: StoreHit {
                id: "id".to_string(),
                collection: "c".to_string(),
                collection_id: 1,
                path: format!("{}.md", title),
                title: title.to_string(),
                body: body.to_string(),
                frontmatter: serde_json::Value::Object(Default::default()),
                content_hash: "h".to_string(),
                updated_at: 0,
                score,
            },
            score,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_blend_external() {
        assert!((blend_external(1.0, 0.0) - 0.4).abs() < 1e-6);
        assert!((blend_external(0.0, 1.0) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_keyword_terms_drop_short() {
        assert_eq!(keyword_terms("a Rust of IT"), vec!["rust", "of", "it"]);
        assert!(keyword_terms("x y z").is_empty());
    }

    #[test]
    fn test_keyword_rerank_prefers_matches() {
        let mut candidates = vec![
            candidate("pasta", "boil water and cook pasta", 0.9),
            candidate("rust", "rust is a systems language, rust is fast", 0.5),
        ];
        keyword_rerank("rust language", &mut candidates);

        assert!(
            candidates[1].score > candidates[0].score,
            "matching candidate overtakes a higher fused score"
        );
    }

    #[test]
    fn test_keyword_rerank_boundary_bonus() {
        let mut exact = vec![candidate("n", "the cat sat", 0.0)];
        let mut substring = vec![candidate("n", "concatenation", 0.0)];
        keyword_rerank("cat", &mut exact);
        keyword_rerank("cat", &mut substring);

        assert!(exact[0].score > substring[0].score);
    }

    #[test]
    fn test_keyword_rerank_no_terms_is_noop() {
        let mut candidates = vec![candidate("t", "body", 0.42)];
        keyword_rerank("a b", &mut candidates);
        assert_eq!(candidates[0].score, 0.42);
    }

    #[test]
    fn test_count_occurrences() {
        assert_eq!(count_occurrences("rust rust rusty", "rust"), 3);
        assert_eq!(count_occurrences("nothing here", "rust"), 0);
    }
}

//! Core domain types for the mnemo engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which retrieval source produced a search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankSource {
    /// Lexical BM25 ranking only.
    Bm25,
    /// Dense-vector nearest-neighbor ranking only.
    Vec,
    /// Fused lexical + vector ranking.
    Hybrid,
}

impl std::fmt::Display for RankSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RankSource::Bm25 => write!(f, "bm25"),
            RankSource::Vec => write!(f, "vec"),
            RankSource::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// A named collection of Markdown files under one root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    /// Monotonic row id.
    pub id: i64,

    /// Unique collection name.
    pub name: String,

    /// Absolute root directory.
    pub root: PathBuf,

    /// File glob; `**/*.md` is the only supported pattern.
    pub glob: String,

    /// Creation timestamp (Unix millis).
    pub created_at: i64,
}

/// A document row: one Markdown file inside a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable 12-hex id derived from `sha256(content_hash|path)`.
    pub id: String,

    /// Owning collection.
    pub collection_id: i64,

    /// Path relative to the collection root.
    pub path: String,

    /// Title from front-matter, or the file stem.
    pub title: String,

    /// md5 of the body after front-matter.
    pub content_hash: String,

    /// Opaque front-matter as JSON.
    #[serde(default)]
    pub frontmatter: serde_json::Value,

    /// False when the backing file is missing from disk.
    pub active: bool,

    /// Creation timestamp (Unix millis).
    pub created_at: i64,

    /// Last update timestamp (Unix millis).
    pub updated_at: i64,
}

/// A single ranked search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Document id.
    pub id: String,

    /// Collection name.
    pub collection: String,

    /// Path relative to the collection root.
    pub path: String,

    /// Document title.
    pub title: String,

    /// Body content (may be truncated to a preview at the facade).
    pub content: String,

    /// Relevance score; higher is better, non-increasing within a result set.
    pub score: f32,

    /// Which retrieval source produced this hit.
    pub source: RankSource,

    /// Front-matter as JSON.
    #[serde(default)]
    pub frontmatter: serde_json::Value,

    /// Last update timestamp (Unix millis).
    pub updated_at: i64,
}

/// Outcome of an indexing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    /// Files parsed and upserted.
    pub indexed: usize,

    /// Files skipped because their content hash was unchanged.
    pub skipped: usize,

    /// Files that failed to read or parse.
    pub failed: usize,
}

impl IndexReport {
    /// Accumulate another report into this one.
    pub fn merge(&mut self, other: IndexReport) {
        self.indexed += other.indexed;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Embedding progress over active documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingStatus {
    /// Active documents in total.
    pub total: u64,

    /// Active documents with a stored vector.
    pub embedded: u64,

    /// Active documents still awaiting a vector.
    pub pending: u64,
}

/// A content hash awaiting embedding, with one of its paths as a log probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEmbedding {
    /// The content hash missing a `seq=0` vector.
    pub content_hash: String,

    /// MIN(path) across documents sharing the hash, for logging only.
    pub probe_path: String,
}

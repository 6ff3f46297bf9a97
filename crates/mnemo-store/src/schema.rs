//! Database schema definitions.

/// Main schema SQL for initializing the database.
///
/// The FTS table is row-synced explicitly by the store (the indexed text is
/// CJK-segmented before insertion, so triggers over `documents` could not
/// keep it coherent). Its rowid always mirrors `documents.rowid`.
pub const SCHEMA: &str = r#"
-- Collection roots
CREATE TABLE IF NOT EXISTS collections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    root TEXT NOT NULL,
    glob TEXT NOT NULL DEFAULT '**/*.md',
    created_at INTEGER NOT NULL
);

-- Document rows; soft-deleted via active=0, unique per (collection, path)
CREATE TABLE IF NOT EXISTS documents (
    id TEXT NOT NULL,
    collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
    path TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    content_hash TEXT NOT NULL,
    frontmatter TEXT NOT NULL DEFAULT '{}',
    active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE(collection_id, path)
);

CREATE INDEX IF NOT EXISTS idx_documents_hash ON documents(content_hash);
CREATE INDEX IF NOT EXISTS idx_documents_active ON documents(active);

-- Content-addressed bodies, shared across documents with identical text
CREATE TABLE IF NOT EXISTS content (
    content_hash TEXT PRIMARY KEY,
    body TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    updated_at INTEGER NOT NULL
);

-- Chunk metadata; every row has a vectors row keyed "{content_hash}_{seq}"
CREATE TABLE IF NOT EXISTS content_vectors (
    content_hash TEXT NOT NULL,
    seq INTEGER NOT NULL,
    pos INTEGER NOT NULL,
    model_name TEXT NOT NULL,
    embedded_at INTEGER NOT NULL,
    PRIMARY KEY (content_hash, seq)
);

-- Key/value store metadata (vector dimension, model name)
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- FTS5 index over (title, doc); unicode61 without stemming preserves CJK
CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
    title,
    doc,
    tokenize = 'unicode61 remove_diacritics 2'
);
"#;

/// Build the vec0 virtual table DDL for a given dimension.
///
/// Must be executed after the sqlite-vec extension is loaded.
pub fn vec_table_sql(dimension: usize) -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS vectors USING vec0(\n\
         \x20   hash_seq TEXT PRIMARY KEY,\n\
         \x20   embedding float[{}] distance_metric=cosine\n\
         );",
        dimension
    )
}

/// Meta key recording the vector table dimension.
pub const META_VEC_DIMENSION: &str = "vec_dimension";

/// Meta key recording the embedding model name.
pub const META_EMBEDDING_MODEL: &str = "embedding_model";

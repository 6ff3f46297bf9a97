//! SQLite-backed index store.
//!
//! Owns the embedded database: document rows, the content-addressed content
//! store, the FTS5 index, and the sqlite-vec virtual table. The write path
//! runs upsert + FTS sync + orphan GC as a single transaction so readers
//! never observe a half-applied coherence step.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, info, warn};

use mnemo_core::ids::{content_hash as body_hash, doc_id, now_millis, vec_key};
use mnemo_core::{Collection, Document, EmbeddingStatus, MnemoError, PendingEmbedding, Result};

use crate::fts::{build_match_query, escape_like_prefix, normalize_bm25, segment_cjk};
use crate::schema::{vec_table_sql, META_EMBEDDING_MODEL, META_VEC_DIMENSION, SCHEMA};

/// Attempts for writes that hit SQLITE_BUSY before giving up.
const BUSY_RETRIES: u32 = 3;

/// A raw search row before fusion and reranking.
#[derive(Debug, Clone)]
pub struct StoreHit {
    /// Document id.
    pub id: String,

    /// Collection name.
    pub collection: String,

    /// Collection row id.
    pub collection_id: i64,

    /// Path relative to the collection root.
    pub path: String,

    /// Document title.
    pub title: String,

    /// Full body text.
    pub body: String,

    /// Front-matter as JSON.
    pub frontmatter: serde_json::Value,

    /// Content hash of the body.
    pub content_hash: String,

    /// Last update timestamp (Unix millis).
    pub updated_at: i64,

    /// Source-specific score; higher is better.
    pub score: f32,
}

/// SQLite store for documents, content, FTS, and vectors.
pub struct Store {
    /// Connection wrapped in a blocking Mutex; WAL mode allows concurrent
    /// readers from other handles, but this process funnels through one.
    conn: Arc<Mutex<Connection>>,

    /// Whether the sqlite-vec extension loaded.
    vec_enabled: bool,

    /// Current vector table dimension.
    dimension: Mutex<usize>,
}

impl Store {
    /// Open or create the database under `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>, dimension: usize) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;

        let conn = Connection::open(data_dir.join("index.sqlite"))
            .map_err(|e| MnemoError::database(format!("Failed to open database: {}", e)))?;

        info!("Database opened at {:?}", data_dir.join("index.sqlite"));
        Self::init(conn, dimension)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory(dimension: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| MnemoError::database(format!("Failed to open in-memory database: {}", e)))?;
        Self::init(conn, dimension)
    }

    fn init(conn: Connection, dimension: usize) -> Result<Self> {
        Self::configure_connection(&conn)?;

        let vec_enabled = Self::try_load_vec_extension(&conn);

        conn.execute_batch(SCHEMA)
            .map_err(|e| MnemoError::database(format!("Failed to initialize schema: {}", e)))?;

        if vec_enabled {
            info!("sqlite-vec extension loaded");
        } else {
            warn!("sqlite-vec extension not available - vector search degrades to empty");
        }

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            vec_enabled,
            dimension: Mutex::new(dimension),
        };
        store.ensure_vec_table_inner(dimension)?;

        Ok(store)
    }

    /// Configure SQLite for WAL and foreign-key enforcement.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 30000;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(|e| MnemoError::database(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    /// Try to load the sqlite-vec extension from common locations.
    fn try_load_vec_extension(conn: &Connection) -> bool {
        let paths = [
            "vec0",
            "libsqlite_vec",
            "/usr/local/lib/libsqlite_vec",
            "/opt/homebrew/lib/libsqlite_vec",
        ];

        unsafe {
            if conn.load_extension_enable().is_err() {
                return false;
            }

            for path in paths {
                if conn.load_extension(path, None).is_ok() {
                    let _ = conn.load_extension_disable();
                    return true;
                }
            }

            let _ = conn.load_extension_disable();
        }

        false
    }

    /// Whether vector search is available.
    pub fn vec_enabled(&self) -> bool {
        self.vec_enabled
    }

    /// The current vector table dimension.
    pub fn dimension(&self) -> usize {
        *self.dimension.lock().unwrap()
    }

    /// Run a closure against the connection on the blocking thread pool,
    /// retrying on SQLITE_BUSY. Async callers never block a worker thread
    /// on the connection lock or the backoff sleeps.
    async fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnMut(&Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || run_retrying(&conn, f))
            .await
            .map_err(|e| MnemoError::internal(format!("blocking task failed: {}", e)))?
    }

    // Collection operations

    /// Insert or update a collection by name.
    ///
    /// `add` is an upsert: re-adding an existing name updates its root and
    /// glob rather than failing.
    pub async fn add_collection(&self, name: &str, root: &Path, glob: &str) -> Result<Collection> {
        let root_str = root.to_string_lossy().to_string();
        let now = now_millis();
        let name = name.to_string();
        let glob = glob.to_string();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO collections (name, root, glob, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(name) DO UPDATE SET root = excluded.root, glob = excluded.glob",
                params![name, root_str, glob, now],
            )?;

            conn.query_row(
                "SELECT id, name, root, glob, created_at FROM collections WHERE name = ?1",
                params![name],
                row_to_collection,
            )
        }).await
    }

    /// Look up a collection by name.
    pub async fn get_collection(&self, name: &str) -> Result<Option<Collection>> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, name, root, glob, created_at FROM collections WHERE name = ?1",
                params![name],
                row_to_collection,
            )
            .optional()
        }).await
    }

    /// List all collections ordered by name.
    pub async fn list_collections(&self) -> Result<Vec<Collection>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, root, glob, created_at FROM collections ORDER BY name",
            )?;
            let rows = stmt.query_map([], row_to_collection)?;
            rows.collect()
        }).await
    }

    /// Remove a collection; documents cascade and orphaned content is GC'd.
    pub async fn remove_collection(&self, name: &str) -> Result<()> {
        let name_owned = name.to_string();
        let vec_enabled = self.vec_enabled;

        let removed = self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;

            let id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM collections WHERE name = ?1",
                    params![name_owned],
                    |r| r.get(0),
                )
                .optional()?;

            let Some(id) = id else {
                return Ok(false);
            };

            // FTS rows do not cascade; drop them before the documents go
            tx.execute(
                "DELETE FROM documents_fts WHERE rowid IN
                 (SELECT rowid FROM documents WHERE collection_id = ?1)",
                params![id],
            )?;
            tx.execute("DELETE FROM collections WHERE id = ?1", params![id])?;

            // GC content no document references any more
            if vec_enabled {
                tx.execute(
                    "DELETE FROM vectors WHERE hash_seq IN
                     (SELECT content_hash || '_' || seq FROM content_vectors
                      WHERE content_hash NOT IN (SELECT content_hash FROM documents))",
                    [],
                )?;
            }
            tx.execute(
                "DELETE FROM content_vectors
                 WHERE content_hash NOT IN (SELECT content_hash FROM documents)",
                [],
            )?;
            tx.execute(
                "DELETE FROM content
                 WHERE content_hash NOT IN (SELECT content_hash FROM documents)
                   AND content_hash NOT IN (SELECT content_hash FROM content_vectors)",
                [],
            )?;

            tx.commit()?;
            Ok(true)
        }).await?;

        if !removed {
            return Err(MnemoError::CollectionNotFound {
                name: name.to_string(),
            });
        }

        debug!("Removed collection: {}", name);
        Ok(())
    }

    // Document operations

    /// Upsert a document, keeping content, FTS, and vectors coherent.
    ///
    /// Runs as one transaction: orphan GC for a replaced content hash,
    /// document row update/insert, content upsert, and an explicit FTS
    /// row re-sync for the affected rowid.
    pub async fn upsert(
        &self,
        collection_id: i64,
        path: &str,
        title: &str,
        body: &str,
        frontmatter: &serde_json::Value,
    ) -> Result<Document> {
        let hash = body_hash(body);
        let id = doc_id(&hash, path);
        let fm = serde_json::to_string(frontmatter)?;
        let now = now_millis();
        let fts_title = segment_cjk(title);
        let fts_doc = segment_cjk(body);
        let vec_enabled = self.vec_enabled;

        let path = path.to_string();
        let title = title.to_string();
        let body = body.to_string();
        let frontmatter = frontmatter.clone();

        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;

            let existing: Option<(i64, String, i64)> = tx
                .query_row(
                    "SELECT rowid, content_hash, created_at FROM documents
                     WHERE collection_id = ?1 AND path = ?2",
                    params![collection_id, path],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                )
                .optional()?;

            // Content changed: if nothing else references the old hash, the
            // old content row and its vectors go in the same write.
            if let Some((_, ref old_hash, _)) = existing {
                if old_hash != &hash {
                    let other_refs: i64 = tx.query_row(
                        "SELECT COUNT(*) FROM documents
                         WHERE content_hash = ?1 AND active = 1
                           AND NOT (collection_id = ?2 AND path = ?3)",
                        params![old_hash, collection_id, path],
                        |r| r.get(0),
                    )?;

                    if other_refs == 0 {
                        tx.execute(
                            "DELETE FROM content_vectors WHERE content_hash = ?1",
                            params![old_hash],
                        )?;
                        if vec_enabled {
                            let pattern = format!("{}\\_%", escape_like_prefix(old_hash));
                            tx.execute(
                                "DELETE FROM vectors WHERE hash_seq LIKE ?1 ESCAPE '\\'",
                                params![pattern],
                            )?;
                        }
                        tx.execute(
                            "DELETE FROM content WHERE content_hash = ?1",
                            params![old_hash],
                        )?;
                    }
                }
            }

            let (rowid, created_at) = match existing {
                Some((rowid, _, created_at)) => {
                    tx.execute(
                        "UPDATE documents
                         SET id = ?1, title = ?2, content_hash = ?3, frontmatter = ?4,
                             active = 1, updated_at = ?5
                         WHERE rowid = ?6",
                        params![id, title, hash, fm, now, rowid],
                    )?;
                    (rowid, created_at)
                }
                None => {
                    tx.execute(
                        "INSERT INTO documents
                         (id, collection_id, path, title, content_hash, frontmatter,
                          active, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)",
                        params![id, collection_id, path, title, hash, fm, now],
                    )?;
                    (tx.last_insert_rowid(), now)
                }
            };

            tx.execute(
                "INSERT INTO content (content_hash, body, title, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(content_hash) DO UPDATE
                 SET title = excluded.title, updated_at = excluded.updated_at",
                params![hash, body, title, now],
            )?;

            // Explicit FTS re-sync; triggers are not relied upon
            tx.execute("DELETE FROM documents_fts WHERE rowid = ?1", params![rowid])?;
            tx.execute(
                "INSERT INTO documents_fts (rowid, title, doc) VALUES (?1, ?2, ?3)",
                params![rowid, fts_title, fts_doc],
            )?;

            tx.commit()?;

            Ok(Document {
                id: id.clone(),
                collection_id,
                path: path.clone(),
                title: title.clone(),
                content_hash: hash.clone(),
                frontmatter: frontmatter.clone(),
                active: true,
                created_at,
                updated_at: now,
            })
        }).await
    }

    /// Fetch a document row by collection and path.
    pub async fn get_document(&self, collection_id: i64, path: &str) -> Result<Option<Document>> {
        let path = path.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, collection_id, path, title, content_hash, frontmatter,
                        active, created_at, updated_at
                 FROM documents WHERE collection_id = ?1 AND path = ?2",
                params![collection_id, path],
                row_to_document,
            )
            .optional()
        }).await
    }

    /// Fetch the first active document matching a relative path across
    /// collections, together with its body.
    pub async fn get_document_by_path(&self, path: &str) -> Result<Option<(Document, String)>> {
        let path = path.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT d.id, d.collection_id, d.path, d.title, d.content_hash,
                        d.frontmatter, d.active, d.created_at, d.updated_at, c.body
                 FROM documents d
                 JOIN content c ON c.content_hash = d.content_hash
                 WHERE d.path = ?1 AND d.active = 1
                 ORDER BY d.collection_id
                 LIMIT 1",
                params![path],
                |row| {
                    let doc = row_to_document(row)?;
                    let body: String = row.get(9)?;
                    Ok((doc, body))
                },
            )
            .optional()
        }).await
    }

    /// The stored content hash and active flag for a document, if any.
    pub async fn stored_hash(
        &self,
        collection_id: i64,
        path: &str,
    ) -> Result<Option<(String, bool)>> {
        let path = path.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT content_hash, active FROM documents
                 WHERE collection_id = ?1 AND path = ?2",
                params![collection_id, path],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
        }).await
    }

    /// Fetch a content body by hash.
    pub async fn get_body(&self, content_hash: &str) -> Result<Option<String>> {
        let content_hash = content_hash.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT body FROM content WHERE content_hash = ?1",
                params![content_hash],
                |r| r.get(0),
            )
            .optional()
        }).await
    }

    /// Soft-delete documents whose paths were not observed on disk.
    ///
    /// Rows are never removed, so a file that reappears at the same path is
    /// restored by the normal upsert. Returns the number deactivated.
    pub async fn deactivate_missing(
        &self,
        collection_id: i64,
        observed: &HashSet<String>,
    ) -> Result<usize> {
        let observed = observed.clone();
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;

            let stored: Vec<(i64, String)> = {
                let mut stmt = tx.prepare(
                    "SELECT rowid, path FROM documents
                     WHERE collection_id = ?1 AND active = 1",
                )?;
                let rows = stmt.query_map(params![collection_id], |r| {
                    Ok((r.get(0)?, r.get(1)?))
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            let mut deactivated = 0usize;
            for (rowid, path) in stored {
                if !observed.contains(&path) {
                    tx.execute(
                        "UPDATE documents SET active = 0 WHERE rowid = ?1",
                        params![rowid],
                    )?;
                    deactivated += 1;
                }
            }

            tx.commit()?;
            Ok(deactivated)
        }).await
    }

    // Search primitives

    /// BM25 keyword search over active documents.
    ///
    /// Scores are normalized to `|s| / (1 + |s|)` so they are comparable
    /// across queries. An empty or unusable query returns no rows without
    /// touching the FTS index.
    pub async fn bm25(
        &self,
        query: &str,
        collection: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoreHit>> {
        let Some(match_expr) = build_match_query(query) else {
            return Ok(Vec::new());
        };
        let collection = collection.map(String::from);

        self.with_conn(move |conn| {
            if let Some(coll) = &collection {
                let mut stmt = conn.prepare(
                    "SELECT d.id, c.name, d.collection_id, d.path, d.title, ct.body,
                            d.frontmatter, d.content_hash, d.updated_at,
                            bm25(documents_fts) AS s
                     FROM documents_fts
                     JOIN documents d ON d.rowid = documents_fts.rowid
                     JOIN collections c ON c.id = d.collection_id
                     JOIN content ct ON ct.content_hash = d.content_hash
                     WHERE documents_fts MATCH ?1 AND d.active = 1 AND c.name = ?2
                     ORDER BY s
                     LIMIT ?3",
                )?;
                let rows = stmt.query_map(
                    params![match_expr, coll, limit as i64],
                    row_to_bm25_hit,
                )?;
                rows.collect()
            } else {
                let mut stmt = conn.prepare(
                    "SELECT d.id, c.name, d.collection_id, d.path, d.title, ct.body,
                            d.frontmatter, d.content_hash, d.updated_at,
                            bm25(documents_fts) AS s
                     FROM documents_fts
                     JOIN documents d ON d.rowid = documents_fts.rowid
                     JOIN collections c ON c.id = d.collection_id
                     JOIN content ct ON ct.content_hash = d.content_hash
                     WHERE documents_fts MATCH ?1 AND d.active = 1
                     ORDER BY s
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![match_expr, limit as i64], row_to_bm25_hit)?;
                rows.collect()
            }
        }).await
    }

    /// Nearest-neighbor search over document vectors.
    ///
    /// Over-fetches `3 * limit` from the ANN table, dedupes by
    /// `(collection, path)` keeping the minimum distance, and returns
    /// `score = 1 - distance`. Degrades to empty when the extension is
    /// absent or the embedding dimension does not match the table.
    pub async fn vec_search(
        &self,
        embedding: &[f32],
        collection: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoreHit>> {
        if limit == 0 || !self.vec_enabled {
            return Ok(Vec::new());
        }
        if embedding.len() != self.dimension() {
            debug!(
                "Query embedding dimension {} != store dimension {}, returning empty",
                embedding.len(),
                self.dimension()
            );
            return Ok(Vec::new());
        }

        let blob = vec_to_bytes(embedding);
        let k = (limit * 3).max(1) as i64;
        let collection = collection.map(String::from);

        let raw: Vec<StoreHit> = self.with_conn(move |conn| {
            if let Some(coll) = &collection {
                let mut stmt = conn.prepare(
                    "SELECT d.id, c.name, d.collection_id, d.path, d.title, ct.body,
                            d.frontmatter, d.content_hash, d.updated_at, v.distance
                     FROM vectors v
                     JOIN content_vectors cv
                       ON (cv.content_hash || '_' || cv.seq) = v.hash_seq
                     JOIN documents d ON d.content_hash = cv.content_hash
                     JOIN collections c ON c.id = d.collection_id
                     JOIN content ct ON ct.content_hash = d.content_hash
                     WHERE v.embedding MATCH ?1 AND d.active = 1 AND c.name = ?2
                     ORDER BY v.distance
                     LIMIT ?3",
                )?;
                let rows = stmt.query_map(params![blob, coll, k], row_to_vec_hit)?;
                rows.collect()
            } else {
                let mut stmt = conn.prepare(
                    "SELECT d.id, c.name, d.collection_id, d.path, d.title, ct.body,
                            d.frontmatter, d.content_hash, d.updated_at, v.distance
                     FROM vectors v
                     JOIN content_vectors cv
                       ON (cv.content_hash || '_' || cv.seq) = v.hash_seq
                     JOIN documents d ON d.content_hash = cv.content_hash
                     JOIN collections c ON c.id = d.collection_id
                     JOIN content ct ON ct.content_hash = d.content_hash
                     WHERE v.embedding MATCH ?1 AND d.active = 1
                     ORDER BY v.distance
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![blob, k], row_to_vec_hit)?;
                rows.collect()
            }
        }).await?;

        // Dedupe by (collection, path); rows arrive distance-ascending so
        // the first occurrence carries the minimum distance.
        let mut seen: HashSet<(i64, String)> = HashSet::new();
        let mut hits = Vec::with_capacity(raw.len().min(limit));
        for hit in raw {
            if seen.insert((hit.collection_id, hit.path.clone())) {
                hits.push(hit);
                if hits.len() >= limit {
                    break;
                }
            }
        }

        Ok(hits)
    }

    // Embedding management

    /// Content hashes with active documents but no `seq=0` vector row.
    ///
    /// `MIN(path)` rides along as a stable probe for logging. Single-chunk
    /// policy: seq 0 is the whole document; the `(hash, seq, pos)` schema
    /// stays open for chunked embeddings.
    pub async fn hashes_for_embedding(&self) -> Result<Vec<PendingEmbedding>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT d.content_hash, MIN(d.path)
                 FROM documents d
                 WHERE d.active = 1
                   AND d.content_hash NOT IN
                       (SELECT content_hash FROM content_vectors WHERE seq = 0)
                 GROUP BY d.content_hash
                 ORDER BY MIN(d.path)",
            )?;
            let rows = stmt.query_map([], |r| {
                Ok(PendingEmbedding {
                    content_hash: r.get(0)?,
                    probe_path: r.get(1)?,
                })
            })?;
            rows.collect()
        }).await
    }

    /// Write a vector and its chunk metadata in one transaction.
    pub async fn insert_embedding(
        &self,
        content_hash: &str,
        seq: u32,
        pos: u32,
        model_name: &str,
        vector: &[f32],
    ) -> Result<()> {
        if !self.vec_enabled {
            return Err(MnemoError::database(
                "sqlite-vec extension not loaded; cannot store vectors",
            ));
        }

        let key = vec_key(content_hash, seq);
        let blob = vec_to_bytes(vector);
        let now = now_millis();
        let content_hash = content_hash.to_string();
        let model_name = model_name.to_string();

        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute("DELETE FROM vectors WHERE hash_seq = ?1", params![key])?;
            tx.execute(
                "INSERT INTO vectors (hash_seq, embedding) VALUES (?1, ?2)",
                params![key, blob],
            )?;
            tx.execute(
                "INSERT INTO content_vectors (content_hash, seq, pos, model_name, embedded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(content_hash, seq) DO UPDATE
                 SET pos = excluded.pos, model_name = excluded.model_name,
                     embedded_at = excluded.embedded_at",
                params![content_hash, seq, pos, model_name, now],
            )?;
            tx.commit()?;
            Ok(())
        }).await
    }

    /// Fetch a stored vector by content hash and sequence.
    pub async fn content_vector(&self, content_hash: &str, seq: u32) -> Result<Option<Vec<f32>>> {
        if !self.vec_enabled {
            return Ok(None);
        }
        let key = vec_key(content_hash, seq);
        let blob: Option<Vec<u8>> = self.with_conn(move |conn| {
            conn.query_row(
                "SELECT embedding FROM vectors WHERE hash_seq = ?1",
                params![key],
                |r| r.get(0),
            )
            .optional()
        }).await?;
        Ok(blob.map(|b| bytes_to_vec(&b)))
    }

    /// Drop all vectors and chunk metadata, recreating the vector table at
    /// the current dimension. Lexical data is untouched.
    pub async fn clear_all_embeddings(&self) -> Result<()> {
        let dimension = self.dimension();
        let vec_enabled = self.vec_enabled;

        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute("DELETE FROM content_vectors", [])?;
            if vec_enabled {
                tx.execute_batch("DROP TABLE IF EXISTS vectors;")?;
                tx.execute_batch(&vec_table_sql(dimension))?;
            }
            tx.commit()?;
            Ok(())
        }).await?;

        info!("Cleared all embeddings");
        Ok(())
    }

    /// Embedding progress over active documents.
    pub async fn embedding_status(&self) -> Result<EmbeddingStatus> {
        self.with_conn(|conn| {
            let total: u64 = conn.query_row(
                "SELECT COUNT(*) FROM documents WHERE active = 1",
                [],
                |r| r.get(0),
            )?;
            let embedded: u64 = conn.query_row(
                "SELECT COUNT(*) FROM documents
                 WHERE active = 1 AND content_hash IN
                       (SELECT content_hash FROM content_vectors WHERE seq = 0)",
                [],
                |r| r.get(0),
            )?;
            Ok(EmbeddingStatus {
                total,
                embedded,
                pending: total - embedded,
            })
        }).await
    }

    /// Make the vector table match `dimension`.
    ///
    /// No-op when the stored dimension already matches. Otherwise the vector
    /// table and chunk metadata are dropped and recreated: vectors are a
    /// regenerable cache, lexical data is preserved.
    pub async fn ensure_vec_table(&self, dimension: usize) -> Result<()> {
        self.ensure_vec_table_inner(dimension)
    }

    fn ensure_vec_table_inner(&self, dimension: usize) -> Result<()> {
        let vec_enabled = self.vec_enabled;

        run_retrying(&self.conn, move |conn| {
            let stored: Option<String> = conn
                .query_row(
                    "SELECT value FROM meta WHERE key = ?1",
                    params![META_VEC_DIMENSION],
                    |r| r.get(0),
                )
                .optional()?;
            let stored_dim = stored.and_then(|s| s.parse::<usize>().ok());

            if let Some(old) = stored_dim {
                if old != dimension {
                    info!(
                        "Vector dimension changed {} -> {}, rebuilding vector table",
                        old, dimension
                    );
                    let tx = conn.unchecked_transaction()?;
                    if vec_enabled {
                        tx.execute_batch("DROP TABLE IF EXISTS vectors;")?;
                    }
                    tx.execute("DELETE FROM content_vectors", [])?;
                    tx.commit()?;
                }
            }

            if vec_enabled {
                conn.execute_batch(&vec_table_sql(dimension))?;
            }
            conn.execute(
                "INSERT INTO meta (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![META_VEC_DIMENSION, dimension.to_string()],
            )?;
            Ok(())
        })?;

        *self.dimension.lock().unwrap() = dimension;
        Ok(())
    }

    /// Persist the configured embedding model name.
    pub async fn set_model_name(&self, model: &str) -> Result<()> {
        let model = model.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO meta (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![META_EMBEDDING_MODEL, model],
            )?;
            Ok(())
        }).await
    }

    /// Checkpoint the WAL; called from the engine's `close`.
    pub fn close(&self) -> Result<()> {
        run_retrying(&self.conn, |conn| {
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
            Ok(())
        })
    }
}

/// The shared retry body: used from the blocking pool by [`Store::with_conn`]
/// and directly by the synchronous open/close paths, where contention is not
/// a concern.
fn run_retrying<F, R>(conn: &Mutex<Connection>, mut f: F) -> Result<R>
where
    F: FnMut(&Connection) -> rusqlite::Result<R>,
{
    let conn = conn
        .lock()
        .map_err(|e| MnemoError::database(e.to_string()))?;

    let mut attempt = 0u32;
    loop {
        match f(&conn) {
            Ok(v) => return Ok(v),
            Err(e) if is_busy(&e) && attempt + 1 < BUSY_RETRIES => {
                attempt += 1;
                debug!("Database busy, retry {}/{}", attempt, BUSY_RETRIES);
                std::thread::sleep(Duration::from_millis(50 * attempt as u64));
            }
            Err(e) => return Err(MnemoError::database(e.to_string())),
        }
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}

fn row_to_collection(row: &rusqlite::Row<'_>) -> rusqlite::Result<Collection> {
    let root: String = row.get(2)?;
    Ok(Collection {
        id: row.get(0)?,
        name: row.get(1)?,
        root: root.into(),
        glob: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let fm: String = row.get(5)?;
    Ok(Document {
        id: row.get(0)?,
        collection_id: row.get(1)?,
        path: row.get(2)?,
        title: row.get(3)?,
        content_hash: row.get(4)?,
        frontmatter: serde_json::from_str(&fm).unwrap_or_default(),
        active: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn row_to_hit_base(row: &rusqlite::Row<'_>, score: f32) -> rusqlite::Result<StoreHit> {
    let fm: String = row.get(6)?;
    Ok(StoreHit {
        id: row.get(0)?,
        collection: row.get(1)?,
        collection_id: row.get(2)?,
        path: row.get(3)?,
        title: row.get(4)?,
        body: row.get(5)?,
        frontmatter: serde_json::from_str(&fm).unwrap_or_default(),
        content_hash: row.get(7)?,
        updated_at: row.get(8)?,
        score,
    })
}

fn row_to_bm25_hit(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoreHit> {
    let raw: f64 = row.get(9)?;
    row_to_hit_base(row, normalize_bm25(raw))
}

fn row_to_vec_hit(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoreHit> {
    let distance: f64 = row.get(9)?;
    row_to_hit_base(row, (1.0 - distance) as f32)
}

/// Serialize an f32 vector to little-endian bytes for sqlite-vec.
fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize little-endian bytes back to an f32 vector.
fn bytes_to_vec(b: &[u8]) -> Vec<f32> {
    b.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

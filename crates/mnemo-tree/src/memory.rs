//! The tree memory facade.
//!
//! Writes go to disk first and are then pushed through the indexer, so a
//! failed index update reconverges on the next reindex. Writes to the same
//! key are totally ordered through the per-key lock map.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, warn};

use mnemo_core::{MnemoError, Result, SearchHit};
use mnemo_embed::Embedder;
use mnemo_index::{frontmatter, Indexer};
use mnemo_search::{SearchOptions, Searcher};
use mnemo_store::Store;

use crate::keys::{key_to_path, validate_key};
use crate::locks::KeyLocks;
use crate::view::{self, TreeEntry, TreeNode};
use crate::zones::{count_zone_items, Zone, ZoneRegistry, ZoneStats};

/// A memory document: key, body, and front-matter.
#[derive(Debug, Clone)]
pub struct MemoryNote {
    /// The dotted key.
    pub key: String,

    /// Absolute file path.
    pub path: PathBuf,

    /// Body text after front-matter.
    pub content: String,

    /// Front-matter as JSON.
    pub frontmatter: Value,
}

/// Hierarchical memory over Markdown files.
pub struct MemoryTree {
    root: PathBuf,
    collection_name: String,
    store: Arc<Store>,
    indexer: Arc<Indexer>,
    embedder: Arc<Embedder>,
    searcher: Arc<Searcher>,
    zones: ZoneRegistry,
    locks: KeyLocks,
}

impl MemoryTree {
    pub fn new(
        root: PathBuf,
        collection_name: String,
        store: Arc<Store>,
        indexer: Arc<Indexer>,
        embedder: Arc<Embedder>,
        searcher: Arc<Searcher>,
    ) -> Result<Self> {
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            collection_name,
            store,
            indexer,
            embedder,
            searcher,
            zones: ZoneRegistry::new(),
            locks: KeyLocks::new(),
        })
    }

    /// The memory root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a memory. Metadata merges over any existing front-matter and
    /// the write is atomic; the index is updated afterwards.
    pub async fn set(&self, key: &str, body: &str, meta: Value) -> Result<MemoryNote> {
        validate_key(key)?;
        let path = key_to_path(&self.root, key)?;

        let _guard = self.locks.acquire(key).await;

        let creating = !path.exists();
        let zone = self.zones.matching(key);
        if let Some(zone) = &zone {
            self.enforce_zone(zone, key, creating)?;
        }

        let existing = if creating {
            json!({})
        } else {
            frontmatter::parse(&fs::read_to_string(&path)?).frontmatter
        };

        let merged = merge_frontmatter(key, &existing, &meta, zone.as_ref());
        let content = frontmatter::serialize(&merged, body);
        write_atomic(&path, &content)?;

        self.index_and_embed(&path, body).await;

        Ok(MemoryNote {
            key: key.to_string(),
            path,
            content: body.to_string(),
            frontmatter: merged,
        })
    }

    /// Read a memory by key. `None` when the file does not exist.
    pub async fn get(&self, key: &str) -> Result<Option<MemoryNote>> {
        validate_key(key)?;
        let path = key_to_path(&self.root, key)?;
        if !path.exists() {
            return Ok(None);
        }

        let parsed = frontmatter::parse(&fs::read_to_string(&path)?);
        Ok(Some(MemoryNote {
            key: key.to_string(),
            path,
            content: parsed.body,
            frontmatter: parsed.frontmatter,
        }))
    }

    /// Delete a memory by key.
    ///
    /// The all-dots-are-separators path is tried first; keys whose leaf
    /// contains literal dots fall back to joined-leaf variants and finally
    /// to a parent-directory scan. Returns whether a file was removed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let segments: Vec<String> = validate_key(key)?
            .into_iter()
            .map(str::to_string)
            .collect();
        let _guard = self.locks.acquire(key).await;

        let Some(victim) = self.resolve_delete_target(key, &segments)? else {
            return Ok(false);
        };

        fs::remove_file(&victim)?;
        debug!("Deleted memory file {:?}", victim);

        // Reconcile the index; the walk soft-deletes the missing document
        if let Some(collection) = self.store.get_collection(&self.collection_name).await? {
            if let Err(e) = self.indexer.index_collection(&collection, true).await {
                warn!("Post-delete reindex failed (will reconverge): {}", e);
            }
        }

        Ok(true)
    }

    fn resolve_delete_target(&self, key: &str, segments: &[String]) -> Result<Option<PathBuf>> {
        // Standard mapping
        let standard = key_to_path(&self.root, key)?;
        if standard.is_file() {
            return Ok(Some(standard));
        }

        // Trailing dots as literal file-name characters: fold trailing
        // segments into the leaf, longest directory prefix first
        for join in 2..=segments.len() {
            let split = segments.len() - join;
            let mut path = self.root.clone();
            for segment in &segments[..split] {
                path.push(segment);
            }
            path.push(format!("{}.md", segments[split..].join(".")));
            if path.is_file() {
                return Ok(Some(path));
            }
        }

        // Parent-directory scan for prefix, then contains, matches
        let mut parent = self.root.clone();
        for segment in &segments[..segments.len() - 1] {
            parent.push(segment);
        }
        let leaf = &segments[segments.len() - 1];

        if parent.is_dir() {
            let mut names: Vec<String> = fs::read_dir(&parent)?
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .filter(|n| n.ends_with(".md"))
                .collect();
            names.sort();

            for name in names.iter().filter(|n| n.starts_with(leaf.as_str())) {
                return Ok(Some(parent.join(name)));
            }
            for name in names.iter().filter(|n| n.contains(leaf.as_str())) {
                return Ok(Some(parent.join(name)));
            }
        }

        Ok(None)
    }

    /// Search memories, applying half-life decay to the scores.
    pub async fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchHit>> {
        let mut opts = opts.clone();
        opts.collection = Some(self.collection_name.clone());

        // Hybrid only when an embedding model is already loaded
        let embedding = if self.embedder.is_embedder_loaded() {
            match self.embedder.embed_query(query).await {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Query embedding failed, falling back to lexical: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let mut hits = self
            .searcher
            .hybrid(query, embedding.as_deref(), &opts)
            .await?;
        apply_half_life(&mut hits);
        Ok(hits)
    }

    /// Define or replace a zone.
    pub fn define_zone(&self, zone: Zone) {
        self.zones.define(zone);
    }

    /// Usage statistics per defined zone.
    pub fn zone_stats(&self) -> Vec<ZoneStats> {
        self.zones
            .list()
            .into_iter()
            .map(|zone| ZoneStats {
                items: count_zone_items(&self.root, &zone.key_prefix),
                name: zone.name,
                key_prefix: zone.key_prefix,
                max_items: zone.max_items,
                max_depth: zone.max_depth,
            })
            .collect()
    }

    /// Flat `key → node` map of the whole tree.
    pub fn list(&self) -> Result<BTreeMap<String, TreeNode>> {
        view::list(&self.root)
    }

    /// Nested tree, folders before files.
    pub fn list_tree(&self) -> Result<Vec<TreeEntry>> {
        view::list_tree(&self.root)
    }

    /// Markdown outline for prompt injection.
    pub fn tree_for_prompt(&self, prefix: Option<&str>) -> Result<String> {
        view::tree_for_prompt(&self.root, prefix)
    }

    /// File keys at an exact depth.
    pub fn memories_by_level(&self, level: usize, prefix: Option<&str>) -> Result<Vec<String>> {
        view::memories_by_level(&self.root, level, prefix)
    }

    /// Minimal indented name outline.
    pub fn simple_tree(&self, prefix: Option<&str>) -> Result<String> {
        view::simple_tree(&self.root, prefix)
    }

    fn enforce_zone(&self, zone: &Zone, key: &str, creating: bool) -> Result<()> {
        if let Some(max_depth) = zone.max_depth {
            let depth = zone.relative_depth(key);
            if depth > max_depth {
                return Err(MnemoError::ZoneDepthExceeded {
                    zone: zone.name.clone(),
                    key: key.to_string(),
                    depth,
                    max_depth,
                });
            }
        }

        // Quota applies to file creation only, never to updates
        if creating {
            if let Some(max_items) = zone.max_items {
                let count = count_zone_items(&self.root, &zone.key_prefix);
                if count >= max_items {
                    return Err(MnemoError::ZoneQuotaExceeded {
                        zone: zone.name.clone(),
                        count,
                        max_items,
                    });
                }
            }
        }

        Ok(())
    }

    /// Push a freshly written file through the indexer and, when a model is
    /// live, embed it opportunistically. Failures log; reindex reconverges.
    async fn index_and_embed(&self, path: &Path, body: &str) {
        let collection = match self.store.get_collection(&self.collection_name).await {
            Ok(Some(c)) => c,
            // First write: register the backing collection
            Ok(None) => match self
                .store
                .add_collection(&self.collection_name, &self.root, "**/*.md")
                .await
            {
                Ok(c) => c,
                Err(e) => {
                    warn!("Failed to register memory collection: {}", e);
                    return;
                }
            },
            Err(e) => {
                warn!("Collection lookup failed: {}", e);
                return;
            }
        };

        let doc = match self.indexer.index_file(&collection, path).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Index update for {:?} failed (will reconverge): {}", path, e);
                return;
            }
        };

        if self.store.vec_enabled() && self.embedder.is_embedder_loaded() {
            match self.embedder.embed_document(body).await {
                Ok(vector) => {
                    if let Err(e) = self
                        .store
                        .insert_embedding(
                            &doc.content_hash,
                            0,
                            0,
                            &self.embedder.model_name(),
                            &vector,
                        )
                        .await
                    {
                        warn!("Opportunistic vector insert failed: {}", e);
                    }
                }
                Err(e) => warn!("Opportunistic embed failed: {}", e),
            }
        }
    }
}

/// Merge front-matter for a write.
///
/// Order: `{id, key, type} ← existing ← cleaned_new ← {updated_at: now}`.
/// `id` defaults to the key, `type` to `"archival"`; nulls in the incoming
/// metadata are stripped before merging; zone defaults fill only fields
/// neither the file nor the caller supplied.
fn merge_frontmatter(key: &str, existing: &Value, incoming: &Value, zone: Option<&Zone>) -> Value {
    let mut out = serde_json::Map::new();
    out.insert("id".to_string(), Value::String(key.to_string()));
    out.insert("key".to_string(), Value::String(key.to_string()));
    out.insert("type".to_string(), Value::String("archival".to_string()));

    let supplied = |source: &Value, field: &str| {
        source.get(field).map_or(false, |v| !v.is_null())
    };
    let type_defaulted = !supplied(existing, "type") && !supplied(incoming, "type");
    let half_life_defaulted =
        !supplied(existing, "half_life_days") && !supplied(incoming, "half_life_days");

    if let Some(obj) = existing.as_object() {
        for (k, v) in obj {
            if !v.is_null() {
                out.insert(k.clone(), v.clone());
            }
        }
    }

    if let Some(obj) = incoming.as_object() {
        for (k, v) in obj {
            if !v.is_null() {
                out.insert(k.clone(), v.clone());
            }
        }
    }

    if let Some(zone) = zone {
        if type_defaulted {
            if let Some(t) = &zone.default_type {
                out.insert("type".to_string(), Value::String(t.clone()));
            }
        }
        if half_life_defaulted {
            if let Some(h) = zone.default_half_life_days {
                out.insert("half_life_days".to_string(), json!(h));
            }
        }
    }

    let now = Utc::now().to_rfc3339();
    if !out.contains_key("created_at") {
        out.insert("created_at".to_string(), Value::String(now.clone()));
    }
    out.insert("updated_at".to_string(), Value::String(now));

    Value::Object(out)
}

/// Apply half-life decay to search scores and re-sort.
///
/// `decay = 2^(-days_since_update / half_life_days)`; hits without a
/// positive `half_life_days` pass through unchanged.
pub fn apply_half_life(hits: &mut Vec<SearchHit>) {
    let now = Utc::now();

    for hit in hits.iter_mut() {
        let half_life = hit
            .frontmatter
            .get("half_life_days")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        if half_life <= 0.0 {
            continue;
        }

        let updated = hit
            .frontmatter
            .get("updated_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .or_else(|| DateTime::<Utc>::from_timestamp_millis(hit.updated_at));

        let Some(updated) = updated else { continue };
        let days = (now - updated).num_milliseconds() as f64 / 86_400_000.0;
        if days <= 0.0 {
            continue;
        }

        hit.score *= 2f64.powf(-days / half_life) as f32;
    }

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("md.tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::NodeKind;
    use chrono::Duration;
    use mnemo_core::RankSource;
    use mnemo_embed::mock::{MockFactory, StaticResolver};
    use mnemo_search::RrfWeights;

    async fn tree() -> (tempfile::TempDir, Arc<Store>, MemoryTree) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open_memory(768).unwrap());
        store
            .add_collection("memory", dir.path(), "**/*.md")
            .await
            .unwrap();

        let indexer = Arc::new(Indexer::new(store.clone()));
        let embedder = Arc::new(Embedder::new(
            Arc::new(MockFactory::new(768)),
            Arc::new(StaticResolver),
            "mock".to_string(),
            768,
            None,
        ));
        let searcher = Arc::new(Searcher::new(
            store.clone(),
            embedder.clone(),
            RrfWeights::default(),
        ));
        let memory = MemoryTree::new(
            dir.path().to_path_buf(),
            "memory".to_string(),
            store.clone(),
            indexer,
            embedder,
            searcher,
        )
        .unwrap();
        (dir, store, memory)
    }

    #[tokio::test]
    async fn test_set_get_round_trip() {
        let (_dir, _store, memory) = tree().await;

        memory
            .set("life.work.project_a", "note A", json!({"type": "archival"}))
            .await
            .unwrap();

        let note = memory.get("life.work.project_a").await.unwrap().unwrap();
        assert_eq!(note.content, "note A");
        assert_eq!(note.frontmatter["id"], "life.work.project_a");
        assert_eq!(note.frontmatter["key"], "life.work.project_a");
        assert_eq!(note.frontmatter["type"], "archival");
        assert!(note.frontmatter["updated_at"].is_string());
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let (_dir, _store, memory) = tree().await;
        assert!(memory.get("no.such.key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_twice_single_file_latest_body() {
        let (dir, store, memory) = tree().await;

        memory.set("k", "v1", json!({})).await.unwrap();
        memory.set("k", "v2", json!({})).await.unwrap();

        let note = memory.get("k").await.unwrap().unwrap();
        assert_eq!(note.content, "v2");

        // Exactly one file on disk for the key
        let files: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("md"))
            .collect();
        assert_eq!(files.len(), 1);

        // The index followed: a single active document with the v2 hash
        let collection = store.get_collection("memory").await.unwrap().unwrap();
        let doc = store
            .get_document(collection.id, "k.md")
            .await
            .unwrap()
            .unwrap();
        assert!(doc.active);
        let body = store.get_body(&doc.content_hash).await.unwrap().unwrap();
        assert_eq!(body, "v2");
    }

    #[tokio::test]
    async fn test_metadata_merges_over_existing() {
        let (_dir, _store, memory) = tree().await;

        memory
            .set("note", "first", json!({"tags": ["a"], "custom": 1}))
            .await
            .unwrap();
        let updated = memory
            .set("note", "second", json!({"extra": true, "custom": null}))
            .await
            .unwrap();

        // Old keys survive, nulls are stripped rather than deleting
        assert_eq!(updated.frontmatter["tags"], json!(["a"]));
        assert_eq!(updated.frontmatter["custom"], 1);
        assert_eq!(updated.frontmatter["extra"], true);
    }

    #[tokio::test]
    async fn test_invalid_keys_rejected() {
        let (_dir, _store, memory) = tree().await;

        for key in ["", "a..b", "a/b", "a.b\\c", ".."] {
            let err = memory.set(key, "x", json!({})).await.unwrap_err();
            assert!(
                matches!(err, MnemoError::InvalidKey { .. }),
                "{:?} must be invalid",
                key
            );
        }
    }

    #[tokio::test]
    async fn test_zone_quota_and_depth() {
        let (_dir, _store, memory) = tree().await;

        memory.define_zone(Zone {
            name: "core".to_string(),
            key_prefix: "core".to_string(),
            max_items: Some(5),
            max_depth: Some(2),
            default_type: None,
            default_half_life_days: None,
        });

        for i in 0..5 {
            memory
                .set(&format!("core.x_{}", i), "body", json!({}))
                .await
                .unwrap();
        }

        let err = memory.set("core.x_5", "body", json!({})).await.unwrap_err();
        assert!(matches!(err, MnemoError::ZoneQuotaExceeded { .. }));

        // Updating an existing key is not a creation; the quota ignores it
        memory.set("core.x_0", "updated", json!({})).await.unwrap();

        let err = memory
            .set("core.a.b.c", "body", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, MnemoError::ZoneDepthExceeded { .. }));
    }

    #[tokio::test]
    async fn test_zone_defaults_fill_missing_metadata() {
        let (_dir, _store, memory) = tree().await;

        memory.define_zone(Zone {
            name: "working".to_string(),
            key_prefix: "work".to_string(),
            max_items: None,
            max_depth: None,
            default_type: Some("working".to_string()),
            default_half_life_days: Some(7.0),
        });

        let defaulted = memory.set("work.t1", "x", json!({})).await.unwrap();
        assert_eq!(defaulted.frontmatter["type"], "working");
        assert_eq!(defaulted.frontmatter["half_life_days"], 7.0);

        let explicit = memory
            .set("work.t2", "x", json!({"type": "archival", "half_life_days": 30}))
            .await
            .unwrap();
        assert_eq!(explicit.frontmatter["type"], "archival");
        assert_eq!(explicit.frontmatter["half_life_days"], 30);
    }

    #[tokio::test]
    async fn test_zone_stats() {
        let (_dir, _store, memory) = tree().await;

        memory.define_zone(Zone {
            name: "core".to_string(),
            key_prefix: "core".to_string(),
            max_items: Some(10),
            max_depth: None,
            default_type: None,
            default_half_life_days: None,
        });
        memory.set("core.a", "x", json!({})).await.unwrap();
        memory.set("core.b", "x", json!({})).await.unwrap();

        let stats = memory.zone_stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].items, 2);
        assert_eq!(stats[0].max_items, Some(10));
    }

    #[tokio::test]
    async fn test_list_and_tree_for_prompt_contract() {
        let (_dir, _store, memory) = tree().await;

        memory
            .set("life.work.project_a", "note A", json!({"type": "archival"}))
            .await
            .unwrap();

        let map = memory.list().unwrap();
        assert_eq!(map["life.work.project_a"].kind, NodeKind::File);
        assert_eq!(map["life"].kind, NodeKind::Folder);

        let rendered = memory.tree_for_prompt(None).unwrap();
        assert!(rendered.contains("### life"));
        assert!(rendered.contains("- life.work.project_a: project_a [archival]"));
    }

    #[tokio::test]
    async fn test_delete_standard_path() {
        let (_dir, store, memory) = tree().await;

        memory.set("a.b", "x", json!({})).await.unwrap();
        assert!(memory.delete("a.b").await.unwrap());
        assert!(memory.get("a.b").await.unwrap().is_none());
        assert!(!memory.delete("a.b").await.unwrap(), "second delete is a no-op");

        // The document was soft-deleted in the store
        let collection = store.get_collection("memory").await.unwrap().unwrap();
        let doc = store
            .get_document(collection.id, "a/b.md")
            .await
            .unwrap()
            .unwrap();
        assert!(!doc.active);
    }

    #[tokio::test]
    async fn test_delete_trailing_dot_fallback() {
        let (dir, _store, memory) = tree().await;

        // A leaf whose name contains a literal dot
        fs::create_dir_all(dir.path().join("notes")).unwrap();
        fs::write(dir.path().join("notes/v1.2.md"), "dotted leaf").unwrap();

        assert!(memory.delete("notes.v1.2").await.unwrap());
        assert!(!dir.path().join("notes/v1.2.md").exists());
    }

    #[tokio::test]
    async fn test_delete_parent_scan_fallback() {
        let (dir, _store, memory) = tree().await;

        fs::create_dir_all(dir.path().join("notes")).unwrap();
        fs::write(dir.path().join("notes/report-2024.md"), "scanned").unwrap();

        assert!(memory.delete("notes.report").await.unwrap());
        assert!(!dir.path().join("notes/report-2024.md").exists());
    }

    #[tokio::test]
    async fn test_search_finds_memories() {
        let (_dir, _store, memory) = tree().await;

        memory
            .set("projects.engine", "the turbine spins quickly", json!({}))
            .await
            .unwrap();
        memory
            .set("projects.kitchen", "bake bread slowly", json!({}))
            .await
            .unwrap();

        let hits = memory
            .search("turbine", &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "projects/engine.md");
    }

    #[test]
    fn test_apply_half_life_ranks_fresh_first() {
        let old_updated = (Utc::now() - Duration::days(14)).to_rfc3339();

        let hit = |path: &str, fm: Value| SearchHit {
            id: path.to_string(),
            collection: "memory".to_string(),
            path: path.to_string(),
            title: path.to_string(),
            content: String::new(),
            score: 0.8,
            source: RankSource::Bm25,
            frontmatter: fm,
            updated_at: Utc::now().timestamp_millis(),
        };

        let mut hits = vec![
            hit(
                "old.md",
                json!({"half_life_days": 7, "updated_at": old_updated}),
            ),
            hit("fresh.md", json!({})),
        ];
        apply_half_life(&mut hits);

        assert_eq!(hits[0].path, "fresh.md");
        assert_eq!(hits[0].score, 0.8, "no half-life leaves the score alone");
        // 14 days at half-life 7 is two halvings
        assert!((hits[1].score - 0.2).abs() < 0.01);
    }

    #[test]
    fn test_merge_frontmatter_order() {
        let existing = json!({"id": "custom-id", "tags": ["keep"]});
        let incoming = json!({"tags": ["new"], "drop_me": null});
        let merged = merge_frontmatter("a.b", &existing, &incoming, None);

        // Existing id wins over the key default; incoming wins over existing
        assert_eq!(merged["id"], "custom-id");
        assert_eq!(merged["key"], "a.b");
        assert_eq!(merged["type"], "archival");
        assert_eq!(merged["tags"], json!(["new"]));
        assert!(merged.get("drop_me").is_none());
        assert!(merged["updated_at"].is_string());
    }
}

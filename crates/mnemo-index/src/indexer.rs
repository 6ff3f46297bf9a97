//! Reindexing: walks collection roots and reconciles the store with disk.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use mnemo_core::ids::content_hash;
use mnemo_core::{Collection, Document, IndexReport, Result};
use mnemo_store::Store;

use crate::frontmatter;
use crate::walker::discover_markdown;

/// Walks collections and upserts their documents.
pub struct Indexer {
    store: Arc<Store>,
}

impl Indexer {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Reindex every collection. Per-collection failures are logged and
    /// counted; they never abort the pass.
    pub async fn reindex(&self, incremental: bool) -> Result<IndexReport> {
        let mut report = IndexReport::default();
        for collection in self.store.list_collections().await? {
            match self.index_collection(&collection, incremental).await {
                Ok(r) => report.merge(r),
                Err(e) => {
                    warn!("Reindex of collection {} failed: {}", collection.name, e);
                    report.failed += 1;
                }
            }
        }
        info!(
            "Reindex complete: {} indexed, {} skipped, {} failed",
            report.indexed, report.skipped, report.failed
        );
        Ok(report)
    }

    /// Index one collection: walk, parse, upsert, then soft-delete
    /// documents whose files are gone.
    pub async fn index_collection(
        &self,
        collection: &Collection,
        incremental: bool,
    ) -> Result<IndexReport> {
        let mut report = IndexReport::default();
        let files = discover_markdown(&collection.root)?;
        let mut observed: HashSet<String> = HashSet::with_capacity(files.len());

        for rel in &files {
            let rel_str = rel.to_string_lossy().replace('\\', "/");
            observed.insert(rel_str.clone());

            match self
                .index_one(collection, &collection.root.join(rel), &rel_str, incremental)
                .await
            {
                Ok(true) => report.indexed += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    warn!("Failed to index {:?}: {}", rel, e);
                    report.failed += 1;
                }
            }
        }

        let deactivated = self
            .store
            .deactivate_missing(collection.id, &observed)
            .await?;
        if deactivated > 0 {
            debug!(
                "Deactivated {} missing documents in {}",
                deactivated, collection.name
            );
        }

        Ok(report)
    }

    /// Index a single file that is already known to live under the
    /// collection root. Returns the upserted document.
    pub async fn index_file(
        &self,
        collection: &Collection,
        abs_path: &Path,
    ) -> Result<Document> {
        let rel = abs_path
            .strip_prefix(&collection.root)
            .map_err(|_| {
                mnemo_core::MnemoError::internal(format!(
                    "{:?} is not under collection root {:?}",
                    abs_path, collection.root
                ))
            })?
            .to_string_lossy()
            .replace('\\', "/");

        let content = std::fs::read_to_string(abs_path)?;
        let parsed = frontmatter::parse(&content);
        let title = frontmatter::title_for(&parsed.frontmatter, abs_path);

        self.store
            .upsert(
                collection.id,
                &rel,
                &title,
                &parsed.body,
                &parsed.frontmatter,
            )
            .await
    }

    /// Returns Ok(true) when the file was upserted, Ok(false) when skipped.
    async fn index_one(
        &self,
        collection: &Collection,
        abs_path: &Path,
        rel: &str,
        incremental: bool,
    ) -> Result<bool> {
        let content = std::fs::read_to_string(abs_path)?;
        let parsed = frontmatter::parse(&content);

        if incremental {
            if let Some((stored, active)) = self.store.stored_hash(collection.id, rel).await? {
                if active && stored == content_hash(&parsed.body) {
                    return Ok(false);
                }
            }
        }

        let title = frontmatter::title_for(&parsed.frontmatter, abs_path);
        self.store
            .upsert(
                collection.id,
                rel,
                &title,
                &parsed.body,
                &parsed.frontmatter,
            )
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    async fn setup() -> (tempfile::TempDir, Arc<Store>, Indexer, Collection) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open_memory(768).unwrap());
        let collection = store
            .add_collection("notes", dir.path(), "**/*.md")
            .await
            .unwrap();
        let indexer = Indexer::new(store.clone());
        (dir, store, indexer, collection)
    }

    #[tokio::test]
    async fn test_index_collection_counts() {
        let (dir, _store, indexer, collection) = setup().await;

        fs::write(dir.path().join("a.md"), "---\ntitle: A\n---\nalpha").unwrap();
        fs::write(dir.path().join("b.md"), "bravo, no front-matter").unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/c.md"), "charlie").unwrap();

        let report = indexer.index_collection(&collection, false).await.unwrap();
        assert_eq!(report.indexed, 3);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_incremental_skips_unchanged() {
        let (dir, _store, indexer, collection) = setup().await;

        fs::write(dir.path().join("a.md"), "stable body").unwrap();
        let first = indexer.index_collection(&collection, true).await.unwrap();
        assert_eq!(first.indexed, 1);

        let second = indexer.index_collection(&collection, true).await.unwrap();
        assert_eq!(second.indexed, 0);
        assert_eq!(second.skipped, 1);

        fs::write(dir.path().join("a.md"), "changed body").unwrap();
        let third = indexer.index_collection(&collection, true).await.unwrap();
        assert_eq!(third.indexed, 1);
    }

    #[tokio::test]
    async fn test_missing_files_are_soft_deleted() {
        let (dir, store, indexer, collection) = setup().await;

        fs::write(dir.path().join("keep.md"), "keep").unwrap();
        fs::write(dir.path().join("gone.md"), "gone").unwrap();
        indexer.index_collection(&collection, false).await.unwrap();

        fs::remove_file(dir.path().join("gone.md")).unwrap();
        indexer.index_collection(&collection, false).await.unwrap();

        let doc = store
            .get_document(collection.id, "gone.md")
            .await
            .unwrap()
            .unwrap();
        assert!(!doc.active);

        // The file coming back restores the document by path
        fs::write(dir.path().join("gone.md"), "gone").unwrap();
        indexer.index_collection(&collection, false).await.unwrap();
        let doc = store
            .get_document(collection.id, "gone.md")
            .await
            .unwrap()
            .unwrap();
        assert!(doc.active);
    }

    #[tokio::test]
    async fn test_title_from_frontmatter_or_stem() {
        let (dir, store, indexer, collection) = setup().await;

        fs::write(dir.path().join("named.md"), "---\ntitle: Custom Name\n---\nx").unwrap();
        fs::write(dir.path().join("plain_note.md"), "x").unwrap();
        indexer.index_collection(&collection, false).await.unwrap();

        let named = store
            .get_document(collection.id, "named.md")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(named.title, "Custom Name");

        let plain = store
            .get_document(collection.id, "plain_note.md")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(plain.title, "plain_note");
    }

    #[tokio::test]
    async fn test_index_file_single() {
        let (dir, _store, indexer, collection) = setup().await;

        let path = dir.path().join("one.md");
        fs::write(&path, "---\ntitle: One\n---\nsingle file").unwrap();

        let doc = indexer.index_file(&collection, &path).await.unwrap();
        assert_eq!(doc.path, "one.md");
        assert_eq!(doc.title, "One");
    }

    #[tokio::test]
    async fn test_reindex_sums_collections() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open_memory(768).unwrap());
        store
            .add_collection("a", dir_a.path(), "**/*.md")
            .await
            .unwrap();
        store
            .add_collection("b", dir_b.path(), "**/*.md")
            .await
            .unwrap();

        for i in 0..3 {
            fs::write(dir_a.path().join(format!("{i}.md")), format!("doc {i}")).unwrap();
        }
        for i in 0..2 {
            fs::write(dir_b.path().join(format!("{i}.md")), format!("note {i}")).unwrap();
        }

        let indexer = Indexer::new(store);
        let report = indexer.reindex(false).await.unwrap();
        assert_eq!(report.indexed, 5);
        assert_eq!(report.failed, 0);
    }
}

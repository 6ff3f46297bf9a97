//! End-to-end tests over the engine facade.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use mnemo_core::MnemoConfig;
use mnemo_embed::mock::MockFactory;
use mnemo_engine::{Engine, QueryParams, SearchParams};
use mnemo_search::SearchOptions;

struct Fixture {
    engine: Engine,
    _data: tempfile::TempDir,
}

async fn engine() -> Fixture {
    tracing_subscriber::fmt().with_test_writer().try_init().ok();
    let data = tempfile::tempdir().unwrap();
    let config = MnemoConfig::at(data.path());
    let engine = Engine::new(config, Arc::new(MockFactory::new(768)));
    engine.initialize().await.unwrap();
    Fixture {
        engine,
        _data: data,
    }
}

fn write_docs(dir: &Path, docs: &[(&str, &str)]) {
    for (name, body) in docs {
        fs::write(dir.join(name), body).unwrap();
    }
}

#[tokio::test]
async fn initialize_is_idempotent() {
    let fixture = engine().await;
    fixture.engine.initialize().await.unwrap();
    fixture.engine.initialize().await.unwrap();
    fixture.engine.close().await.unwrap();
    // Closing twice is fine as well
    fixture.engine.close().await.unwrap();
}

#[tokio::test]
async fn two_collections_reindex_and_remove() {
    let fixture = engine().await;
    let engine = &fixture.engine;

    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    write_docs(
        dir_a.path(),
        &[
            ("one.md", "the first alpha document"),
            ("two.md", "the second alpha document"),
            ("three.md", "the third alpha document"),
        ],
    );
    write_docs(
        dir_b.path(),
        &[
            ("x.md", "bravo content here"),
            ("y.md", "more bravo content"),
        ],
    );

    engine.add_collection("A", dir_a.path(), None).await.unwrap();
    engine.add_collection("B", dir_b.path(), None).await.unwrap();

    let report = engine.reindex(false).await.unwrap();
    assert_eq!(report.indexed, 5);
    assert_eq!(report.failed, 0);

    assert_eq!(engine.list_collections().await.unwrap().len(), 2);

    engine.remove_collection("B").await.unwrap();
    assert_eq!(engine.list_collections().await.unwrap().len(), 1);

    // A removed collection matches nothing
    let hits = engine
        .search(
            "bravo",
            &SearchParams {
                collection: Some("B".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn search_edge_cases() {
    let fixture = engine().await;
    let engine = &fixture.engine;

    let dir = tempfile::tempdir().unwrap();
    write_docs(
        dir.path(),
        &[
            ("a.md", "rust programming language"),
            ("b.md", "rust borrow checker"),
        ],
    );
    engine
        .add_collection("notes", dir.path(), None)
        .await
        .unwrap();
    engine.reindex(false).await.unwrap();

    assert!(engine
        .search("", &SearchParams::default())
        .await
        .unwrap()
        .is_empty());

    assert!(engine
        .search("nonexistent-xyz", &SearchParams::default())
        .await
        .unwrap()
        .is_empty());

    let limited = engine
        .search(
            "rust",
            &SearchParams {
                limit: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(limited.len() <= 1);

    let all = engine
        .search("rust", &SearchParams::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    for window in all.windows(2) {
        assert!(window[0].score >= window[1].score);
    }
}

#[tokio::test]
async fn zero_limit_returns_no_results() {
    let fixture = engine().await;
    let engine = &fixture.engine;

    let dir = tempfile::tempdir().unwrap();
    write_docs(dir.path(), &[("a.md", "alpha content")]);
    engine
        .add_collection("notes", dir.path(), None)
        .await
        .unwrap();
    engine.reindex(false).await.unwrap();

    let params = SearchParams {
        limit: Some(0),
        ..Default::default()
    };
    assert!(engine.search("alpha", &params).await.unwrap().is_empty());
    assert!(engine
        .vsearch(&vec![0.0f32; 768], &params)
        .await
        .unwrap()
        .is_empty());

    let hits = engine
        .query(
            "alpha",
            None,
            &QueryParams {
                limit: Some(0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn memory_set_get_list_and_prompt_tree() {
    let fixture = engine().await;
    let memory = fixture.engine.memory().await.unwrap();

    memory
        .set("life.work.project_a", "note A", json!({"type": "archival"}))
        .await
        .unwrap();

    let note = memory.get("life.work.project_a").await.unwrap().unwrap();
    assert_eq!(note.content, "note A");

    let map = memory.list().unwrap();
    assert_eq!(
        serde_json::to_value(&map["life.work.project_a"]).unwrap()["_type"],
        "file"
    );

    let rendered = memory.tree_for_prompt(None).unwrap();
    assert!(rendered.contains("### life"));
    assert!(rendered.contains("- life.work.project_a: project_a [archival]"));
}

#[tokio::test]
async fn memory_set_twice_converges() {
    let fixture = engine().await;
    let engine = &fixture.engine;
    let memory = engine.memory().await.unwrap();

    memory.set("k", "v1", json!({})).await.unwrap();
    memory.set("k", "v2", json!({})).await.unwrap();

    // One file, latest body, visible through the engine by path
    let (doc, body) = engine.get("k.md").await.unwrap().unwrap();
    assert!(doc.active);
    assert_eq!(body, "v2");

    // After the overwrite only the v2 hash is pending embedding
    let pending = engine.get_hashes_for_embedding().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].content_hash, doc.content_hash);

    let status = engine.embedding_status().await.unwrap();
    assert_eq!(status.total, 1);
    assert_eq!(status.embedded, 0);
}

#[tokio::test]
async fn zone_quota_and_depth_through_engine() {
    let fixture = engine().await;
    let memory = fixture.engine.memory().await.unwrap();

    memory.define_zone(mnemo_engine::Zone {
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
    assert!(memory.set("core.x_5", "body", json!({})).await.is_err());
    assert!(memory.set("core.a.b.c", "body", json!({})).await.is_err());

    let stats = memory.zone_stats();
    assert_eq!(stats[0].items, 5);
}

#[tokio::test]
async fn half_life_ranks_fresh_document_first() {
    let fixture = engine().await;
    let engine = &fixture.engine;
    let memory = engine.memory().await.unwrap();

    // First write registers the memory collection
    memory
        .set("warmup", "completely unrelated text", json!({}))
        .await
        .unwrap();

    // Two identical bodies; one decays with a 14-day-old timestamp
    let old = (Utc::now() - Duration::days(14)).to_rfc3339();
    let root = memory.root().to_path_buf();
    fs::write(
        root.join("stale.md"),
        format!(
            "---\nhalf_life_days: 7\nupdated_at: \"{}\"\n---\nthe zebra migration notes",
            old
        ),
    )
    .unwrap();
    fs::write(root.join("fresh.md"), "the zebra migration notes").unwrap();

    engine.reindex(false).await.unwrap();

    let hits = memory
        .search("zebra migration", &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].path, "fresh.md");
    assert!(hits[0].score > hits[1].score);
    // Two half-lives knock the stale copy down to about a quarter
    assert!(hits[1].score < hits[0].score * 0.5);
}

#[tokio::test]
async fn model_lifecycle_through_engine() {
    let fixture = engine().await;
    let engine = &fixture.engine;

    assert!(!engine.is_embedding_model_loaded().await.unwrap());

    engine.preload_embedding_model().await.unwrap();
    assert!(engine.is_embedding_model_loaded().await.unwrap());

    let vector = engine.embed_query("hello").await.unwrap();
    assert_eq!(vector.len(), 768);

    let batch = engine
        .embed_batch(&["a".to_string(), "b".to_string()])
        .await
        .unwrap();
    assert_eq!(batch.len(), 2);
    assert!(batch.iter().all(Option::is_some));

    assert_eq!(engine.get_embedding_dimension().await.unwrap(), 768);

    engine.set_embedding_model("other-model", 384).await.unwrap();
    assert_eq!(engine.get_embedding_dimension().await.unwrap(), 384);
    assert_eq!(engine.get_embedding_model().await.unwrap(), "other-model");
    // Switching models unloads the context
    assert!(!engine.is_embedding_model_loaded().await.unwrap());
}

#[tokio::test]
async fn clear_all_embeddings_resets_status() {
    let fixture = engine().await;
    let engine = &fixture.engine;

    let dir = tempfile::tempdir().unwrap();
    write_docs(dir.path(), &[("a.md", "alpha"), ("b.md", "beta")]);
    engine
        .add_collection("notes", dir.path(), None)
        .await
        .unwrap();
    engine.reindex(false).await.unwrap();

    engine.clear_all_embeddings().await.unwrap();

    let status = engine.embedding_status().await.unwrap();
    assert_eq!(status.embedded, 0);
    assert_eq!(
        engine.get_hashes_for_embedding().await.unwrap().len() as u64,
        status.total
    );
}

#[tokio::test]
async fn query_pipeline_with_external_rerank() {
    let fixture = engine().await;
    let engine = &fixture.engine;

    let dir = tempfile::tempdir().unwrap();
    write_docs(
        dir.path(),
        &[
            ("a.md", "shared term, first document"),
            ("b.md", "shared term, second document"),
        ],
    );
    engine
        .add_collection("notes", dir.path(), None)
        .await
        .unwrap();
    engine.reindex(false).await.unwrap();

    let rerank: mnemo_engine::RerankFn = Arc::new(|_query: &str, docs: &[String]| {
        // Prefer the second document unconditionally
        docs.iter()
            .map(|d| if d.contains("second") { 1.0 } else { 0.0 })
            .collect()
    });

    let hits = engine
        .query(
            "shared term",
            None,
            &QueryParams {
                rerank: Some(rerank),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(hits.len(), 2);
    // Without vectors the pipeline is lexical-only and the callback does
    // not engage; ordering is still deterministic and bounded
    for window in hits.windows(2) {
        assert!(window[0].score >= window[1].score);
    }
}

#[tokio::test]
async fn content_previews_are_truncated() {
    let fixture = engine().await;
    let engine = &fixture.engine;

    let dir = tempfile::tempdir().unwrap();
    let long_body = format!("needle {}", "x".repeat(2000));
    write_docs(dir.path(), &[("long.md", long_body.as_str())]);
    engine
        .add_collection("notes", dir.path(), None)
        .await
        .unwrap();
    engine.reindex(false).await.unwrap();

    let hits = engine
        .search("needle", &SearchParams::default())
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].content.len() <= 500);
}

#[tokio::test]
async fn auto_embed_watcher_lifecycle() {
    let fixture = engine().await;
    let engine = &fixture.engine;

    let dir = tempfile::tempdir().unwrap();
    engine
        .add_collection("notes", dir.path(), None)
        .await
        .unwrap();

    engine.start_auto_embed().await.unwrap();
    // Second start is a warning no-op
    engine.start_auto_embed().await.unwrap();

    engine.stop_auto_embed().await.unwrap();
    engine.stop_auto_embed().await.unwrap();

    engine.close().await.unwrap();
}

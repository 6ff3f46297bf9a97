//! mnemo-engine - the public facade
//!
//! mnemo is a local hybrid document search engine over Markdown
//! collections, with a tree-structured memory facade layered on top. It
//! keeps a lexical BM25 index, a dense-vector index, and a content store
//! coherent with the files on disk, and answers queries by fusing lexical
//! and semantic ranking.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use mnemo_core::MnemoConfig;
//! use mnemo_embed::mock::MockFactory;
//! use mnemo_engine::{Engine, SearchParams};
//!
//! # async fn run() -> mnemo_core::Result<()> {
//! let config = MnemoConfig::at("/tmp/mnemo-data");
//! let engine = Engine::new(config, Arc::new(MockFactory::new(768)));
//! engine.initialize().await?;
//!
//! engine
//!     .add_collection("notes", std::path::Path::new("/home/me/notes"), None)
//!     .await?;
//! engine.reindex(false).await?;
//!
//! let hits = engine.search("rust async", &SearchParams::default()).await?;
//! for hit in &hits {
//!     println!("{:.3} {}:{}", hit.score, hit.collection, hit.path);
//! }
//!
//! // The memory facade
//! let memory = engine.memory().await?;
//! memory
//!     .set("life.work.todo", "ship the release", serde_json::json!({}))
//!     .await?;
//!
//! engine.close().await?;
//! # Ok(())
//! # }
//! ```

mod engine;

pub use engine::{Engine, QueryParams, SearchParams, MEMORY_COLLECTION};

// Re-export the surface callers compose with
pub use mnemo_core::{
    Collection, Document, EmbeddingStatus, IndexReport, MnemoConfig, MnemoError, PendingEmbedding,
    RankSource, Result, SearchHit,
};
pub use mnemo_search::{RerankFn, SearchOptions};
pub use mnemo_tree::{MemoryNote, MemoryTree, Zone, ZoneStats};
pub use mnemo_watch::WatchState;

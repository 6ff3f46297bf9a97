//! mnemo-store - SQLite storage layer with FTS5 and sqlite-vec
//!
//! This crate owns the embedded database: document and content rows, the
//! lexical FTS index, the vector virtual table, content-addressed dedup,
//! and orphan garbage collection.

mod fts;
mod schema;
mod store;

pub use fts::{build_match_query, segment_cjk};
pub use schema::SCHEMA;
pub use store::{Store, StoreHit};

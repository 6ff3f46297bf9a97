//! mnemo-embed - embedding model lifecycle
//!
//! This crate manages the embedding and reranker model slots: lazy
//! single-flight loading, the query/document formatting contract, and
//! sequential batch embedding. The inference runtimes themselves live
//! behind the backend traits in `mnemo-core`.

mod embedder;
pub mod mock;
mod resolver;

pub use embedder::{format_document, format_query, Embedder};
pub use resolver::LocalResolver;

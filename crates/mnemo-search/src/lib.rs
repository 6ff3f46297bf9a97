//! mnemo-search - hybrid ranking pipeline
//!
//! Fans out BM25 and ANN retrieval in parallel, fuses with reciprocal-rank
//! fusion, and applies the configured rerank strategy.

pub mod fusion;
pub mod rerank;
mod searcher;

pub use fusion::RrfWeights;
pub use searcher::{RerankFn, SearchOptions, Searcher};

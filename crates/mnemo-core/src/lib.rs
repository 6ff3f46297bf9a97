//! mnemo-core - Core types and traits for the mnemo search engine
//!
//! This crate provides the foundational types, traits, error handling, and
//! configuration used throughout the mnemo workspace.

pub mod config;
pub mod error;
pub mod ids;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{MnemoError, Result};
pub use traits::*;
pub use types::*;

//! Error types for the mnemo engine.

use thiserror::Error;

/// Result type alias using MnemoError.
pub type Result<T> = std::result::Result<T, MnemoError>;

/// Errors that can occur in the mnemo engine.
#[derive(Error, Debug)]
pub enum MnemoError {
    /// A memory key violates the segment rules.
    #[error("Invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// A memory key resolves to a path outside the memory root.
    #[error("Key {key:?} escapes the memory root")]
    PathEscape { key: String },

    /// A zone's maximum key depth was exceeded.
    #[error("Zone {zone:?} allows depth {max_depth}, key {key:?} has depth {depth}")]
    ZoneDepthExceeded {
        zone: String,
        key: String,
        depth: usize,
        max_depth: usize,
    },

    /// A zone's item quota was exceeded.
    #[error("Zone {zone:?} is full: {count} of {max_items} items")]
    ZoneQuotaExceeded {
        zone: String,
        count: usize,
        max_items: usize,
    },

    /// Collection root does not exist on disk.
    #[error("Collection root does not exist: {path}")]
    CollectionPathMissing { path: String },

    /// Collection not found.
    #[error("Collection not found: {name}")]
    CollectionNotFound { name: String },

    /// Model file not found locally and could not be fetched.
    #[error("Model unavailable: {model} - {reason}")]
    ModelUnavailable { model: String, reason: String },

    /// Model load exceeded the configured timeout.
    #[error("Model load timed out after {seconds}s: {model}")]
    ModelLoadTimeout { model: String, seconds: u64 },

    /// The embedding context is gone or was never constructed.
    #[error("Embedding context unavailable: {message}")]
    EmbeddingContextUnavailable { message: String },

    /// Database error.
    #[error("Database error: {message}")]
    Database { message: String },

    /// Embedding model error.
    #[error("Embedding error: {message}")]
    Embedding { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl MnemoError {
    /// Create an invalid key error.
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get a stable error code for programmatic handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidKey { .. } => "INVALID_KEY",
            Self::PathEscape { .. } => "PATH_ESCAPE",
            Self::ZoneDepthExceeded { .. } => "ZONE_DEPTH_EXCEEDED",
            Self::ZoneQuotaExceeded { .. } => "ZONE_QUOTA_EXCEEDED",
            Self::CollectionPathMissing { .. } => "COLLECTION_PATH_MISSING",
            Self::CollectionNotFound { .. } => "COLLECTION_NOT_FOUND",
            Self::ModelUnavailable { .. } => "MODEL_UNAVAILABLE",
            Self::ModelLoadTimeout { .. } => "MODEL_LOAD_TIMEOUT",
            Self::EmbeddingContextUnavailable { .. } => "EMBEDDING_CONTEXT_UNAVAILABLE",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

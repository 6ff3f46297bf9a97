//! Collection registry.
//!
//! A thin layer over the store: resolves roots to absolute paths, asserts
//! they exist at add time, and exposes the upsert-by-name semantics.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use mnemo_core::{Collection, MnemoError, Result};
use mnemo_store::Store;

/// Default file pattern for new collections.
pub const DEFAULT_GLOB: &str = "**/*.md";

/// Named collection roots persisted in the store.
pub struct Collections {
    store: Arc<Store>,
}

impl Collections {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Register a collection. Re-adding an existing name updates it.
    pub async fn add(&self, name: &str, root: &Path, glob: Option<&str>) -> Result<Collection> {
        let root = root
            .canonicalize()
            .map_err(|_| MnemoError::CollectionPathMissing {
                path: root.display().to_string(),
            })?;
        if !root.is_dir() {
            return Err(MnemoError::CollectionPathMissing {
                path: root.display().to_string(),
            });
        }

        let collection = self
            .store
            .add_collection(name, &root, glob.unwrap_or(DEFAULT_GLOB))
            .await?;
        debug!("Registered collection {} at {:?}", name, root);
        Ok(collection)
    }

    /// Look up a collection by name.
    pub async fn get(&self, name: &str) -> Result<Option<Collection>> {
        self.store.get_collection(name).await
    }

    /// List all collections.
    pub async fn list(&self) -> Result<Vec<Collection>> {
        self.store.list_collections().await
    }

    /// Remove a collection; its documents cascade.
    pub async fn remove(&self, name: &str) -> Result<()> {
        self.store.remove_collection(name).await
    }
}

//! Model file resolution.
//!
//! A model is named either by a plain file path or by a registry URI of the
//! form `hf:owner/repo/file.gguf`. Resolution checks local search paths
//! first and only then consults an optional remote resolver; without one,
//! an unresolvable model is a structured error.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use mnemo_core::{MnemoError, ModelResolver, Result};

/// Resolves model names against local directories, with an optional remote
/// fallback for registry URIs.
pub struct LocalResolver {
    search_paths: Vec<PathBuf>,
    remote: Option<Arc<dyn ModelResolver>>,
}

impl LocalResolver {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths,
            remote: None,
        }
    }

    /// Attach a remote resolver consulted when no local file matches.
    pub fn with_remote(mut self, remote: Arc<dyn ModelResolver>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// The bare file name a model URI refers to.
    fn file_name(model: &str) -> &str {
        let rest = model.strip_prefix("hf:").unwrap_or(model);
        rest.rsplit('/').next().unwrap_or(rest)
    }
}

impl ModelResolver for LocalResolver {
    fn resolve(&self, model: &str) -> Result<PathBuf> {
        // A direct path wins
        let direct = PathBuf::from(model);
        if direct.is_file() {
            return Ok(direct);
        }

        let file_name = Self::file_name(model);
        for dir in &self.search_paths {
            let candidate = dir.join(file_name);
            if candidate.is_file() {
                debug!("Resolved model {} -> {:?}", model, candidate);
                return Ok(candidate);
            }
        }

        if let Some(remote) = &self.remote {
            return remote.resolve(model);
        }

        Err(MnemoError::ModelUnavailable {
            model: model.to_string(),
            reason: "not found in local search paths and no remote resolver configured"
                .to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_direct_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("model.gguf");
        std::fs::write(&file, b"x").unwrap();

        let resolver = LocalResolver::new(vec![]);
        assert_eq!(resolver.resolve(file.to_str().unwrap()).unwrap(), file);
    }

    #[test]
    fn test_resolve_hf_uri_from_search_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.gguf"), b"x").unwrap();

        let resolver = LocalResolver::new(vec![dir.path().to_path_buf()]);
        let resolved = resolver.resolve("hf:owner/repo/model.gguf").unwrap();
        assert_eq!(resolved, dir.path().join("model.gguf"));
    }

    #[test]
    fn test_resolve_missing_is_model_unavailable() {
        let resolver = LocalResolver::new(vec![PathBuf::from("/nope")]);
        let err = resolver.resolve("hf:owner/repo/absent.gguf").unwrap_err();
        assert!(matches!(err, MnemoError::ModelUnavailable { .. }));
    }
}

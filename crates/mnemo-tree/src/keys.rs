//! Dotted-key ↔ path mapping.
//!
//! The key `a.b.c` maps bijectively to `a/b/c.md` under the memory root.
//! Segment rules keep the mapping safe: no empty segments, no `..`, no
//! path separators. The resolved path is additionally checked to stay
//! under the root.

use std::path::{Path, PathBuf};

use mnemo_core::{MnemoError, Result};

/// Validate a key and return its segments.
pub fn validate_key(key: &str) -> Result<Vec<&str>> {
    if key.is_empty() {
        return Err(MnemoError::invalid_key(key, "key is empty"));
    }

    let segments: Vec<&str> = key.split('.').collect();
    for segment in &segments {
        if segment.is_empty() {
            return Err(MnemoError::invalid_key(key, "empty segment"));
        }
        if *segment == ".." {
            return Err(MnemoError::invalid_key(key, "'..' segment"));
        }
        if segment.contains('/') || segment.contains('\\') {
            return Err(MnemoError::invalid_key(key, "segment contains a path separator"));
        }
    }

    Ok(segments)
}

/// Number of segments in a key; assumes the key is valid.
pub fn key_depth(key: &str) -> usize {
    key.split('.').count()
}

/// The relative path a key maps to: `a.b.c` → `a/b/c.md`.
pub fn key_to_relpath(key: &str) -> Result<PathBuf> {
    let segments = validate_key(key)?;
    let mut path = PathBuf::new();
    for segment in segments {
        path.push(segment);
    }
    path.set_extension("md");
    Ok(path)
}

/// Resolve a key to an absolute path under `root`, rejecting escapes.
pub fn key_to_path(root: &Path, key: &str) -> Result<PathBuf> {
    let path = root.join(key_to_relpath(key)?);
    if !path.starts_with(root) {
        return Err(MnemoError::PathEscape {
            key: key.to_string(),
        });
    }
    Ok(path)
}

/// The key a relative `.md` path maps back to, if any.
pub fn relpath_to_key(rel: &Path) -> Option<String> {
    if rel.extension().and_then(|e| e.to_str()) != Some("md") {
        return None;
    }
    let mut segments = Vec::new();
    let stemmed = rel.with_extension("");
    for component in stemmed.components() {
        match component {
            std::path::Component::Normal(s) => segments.push(s.to_str()?.to_string()),
            _ => return None,
        }
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("."))
    }
}

/// The key an absolute path under `root` maps back to, if any.
pub fn path_to_key(root: &Path, path: &Path) -> Option<String> {
    relpath_to_key(path.strip_prefix(root).ok()?)
}

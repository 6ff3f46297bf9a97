//! Collection directory walking.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use mnemo_core::Result;

/// Recursively discover `.md` files under a root.
///
/// Returns paths relative to the root, sorted for deterministic indexing.
/// Hidden directories and files (dot-prefixed) are skipped. The default
/// `**/*.md` glob is the only supported pattern.
pub fn discover_markdown(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_hidden(e.file_name().to_str()))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!("Walk error under {:?}: {}", root, err);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }

        if let Ok(rel) = entry.path().strip_prefix(root) {
            files.push(rel.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

fn is_hidden(name: Option<&str>) -> bool {
    matches!(name, Some(n) if n.starts_with('.') && n != "." && n != "..")
}

//! Tree enumeration and rendering.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use mnemo_core::Result;
use mnemo_index::frontmatter;

use crate::keys::{key_depth, path_to_key};

/// Node kind in tree listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Folder,
    File,
}

/// A node in the flat `list()` view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    /// `folder` or `file`.
    #[serde(rename = "_type")]
    pub kind: NodeKind,

    /// Title for files (front-matter or stem).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// `type` front-matter value for files.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub note_type: Option<String>,
}

/// A node in the nested `list_tree()` view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Leaf segment name.
    pub name: String,

    /// Full dotted key.
    pub key: String,

    #[serde(rename = "_type")]
    pub kind: NodeKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub note_type: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<TreeEntry>,
}

/// Build the nested tree: folders before files, then alphabetical.
pub fn list_tree(root: &Path) -> Result<Vec<TreeEntry>> {
    build_entries(root, root, "")
}

fn build_entries(root: &Path, dir: &Path, key_prefix: &str) -> Result<Vec<TreeEntry>> {
    let mut folders: Vec<TreeEntry> = Vec::new();
    let mut files: Vec<TreeEntry> = Vec::new();

    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }

        let path = entry.path();
        if path.is_dir() {
            let key = join_key(key_prefix, &name);
            let children = build_entries(root, &path, &key)?;
            folders.push(TreeEntry {
                name,
                key,
                kind: NodeKind::Folder,
                title: None,
                note_type: None,
                children,
            });
        } else if let Some(key) = path_to_key(root, &path) {
            let (title, note_type) = read_file_meta(&path);
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| name.clone());
            files.push(TreeEntry {
                name,
                key,
                kind: NodeKind::File,
                title: Some(title),
                note_type: Some(note_type),
                children: Vec::new(),
            });
        }
    }

    folders.sort_by(|a, b| a.name.cmp(&b.name));
    files.sort_by(|a, b| a.name.cmp(&b.name));
    folders.extend(files);
    Ok(folders)
}

/// Flat `key → node` map over the whole tree.
pub fn list(root: &Path) -> Result<BTreeMap<String, TreeNode>> {
    let mut out = BTreeMap::new();
    flatten(&list_tree(root)?, &mut out);
    Ok(out)
}

fn flatten(entries: &[TreeEntry], out: &mut BTreeMap<String, TreeNode>) {
    for entry in entries {
        out.insert(
            entry.key.clone(),
            TreeNode {
                kind: entry.kind,
                title: entry.title.clone(),
                note_type: entry.note_type.clone(),
            },
        );
        flatten(&entry.children, out);
    }
}

/// Render the Markdown outline used in prompts.
///
/// Each top-level segment gets a `### <root>` header; every file under it
/// renders as `- <key>: <title> [<type>]`, indented two spaces per level
/// below the header. The format is a caller contract.
pub fn tree_for_prompt(root: &Path, prefix: Option<&str>) -> Result<String> {
    let entries = list_tree(root)?;
    let mut out = String::new();

    for entry in &entries {
        if let Some(prefix) = prefix {
            if !key_matches_prefix(&entry.key, prefix) && !prefix.starts_with(&entry.key) {
                continue;
            }
        }

        let mut lines = String::new();
        render_prompt_lines(entry, prefix, &mut lines);
        if !lines.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("### {}\n", entry.name));
            out.push_str(&lines);
        }
    }

    Ok(out)
}

fn render_prompt_lines(entry: &TreeEntry, prefix: Option<&str>, out: &mut String) {
    match entry.kind {
        NodeKind::File => {
            if prefix.map_or(true, |p| key_matches_prefix(&entry.key, p)) {
                let title = entry.title.clone().unwrap_or_else(|| entry.name.clone());
                let note_type = entry
                    .note_type
                    .clone()
                    .unwrap_or_else(|| "archival".to_string());
                // Indent follows the key's depth below its root segment
                let indent = key_depth(&entry.key).saturating_sub(2);
                out.push_str(&format!(
                    "{}- {}: {} [{}]\n",
                    "  ".repeat(indent),
                    entry.key,
                    title,
                    note_type
                ));
            }
        }
        NodeKind::Folder => {
            for child in &entry.children {
                render_prompt_lines(child, prefix, out);
            }
        }
    }
}

/// File keys with exactly `level` segments, optionally under a prefix.
pub fn memories_by_level(root: &Path, level: usize, prefix: Option<&str>) -> Result<Vec<String>> {
    let keys = list(root)?
        .into_iter()
        .filter(|(_, node)| node.kind == NodeKind::File)
        .map(|(key, _)| key)
        .filter(|key| key_depth(key) == level)
        .filter(|key| prefix.map_or(true, |p| key_matches_prefix(key, p)))
        .collect();
    Ok(keys)
}

/// A minimal indented outline of segment names.
pub fn simple_tree(root: &Path, prefix: Option<&str>) -> Result<String> {
    let entries = list_tree(root)?;
    let mut out = String::new();
    for entry in &entries {
        render_simple(entry, prefix, 0, &mut out);
    }
    Ok(out)
}

fn render_simple(entry: &TreeEntry, prefix: Option<&str>, depth: usize, out: &mut String) {
    let visible = match prefix {
        Some(p) => key_matches_prefix(&entry.key, p) || p.starts_with(&entry.key),
        None => true,
    };
    if visible {
        out.push_str(&format!("{}- {}\n", "  ".repeat(depth), entry.name));
    }
    for child in &entry.children {
        render_simple(child, prefix, depth + 1, out);
    }
}

fn key_matches_prefix(key: &str, prefix: &str) -> bool {
    key == prefix || key.starts_with(&format!("{}.", prefix))
}

fn join_key(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn read_file_meta(path: &Path) -> (String, String) {
    let content = fs::read_to_string(path).unwrap_or_default();
    let parsed = frontmatter::parse(&content);
    let title = frontmatter::title_for(&parsed.frontmatter, path);
    let note_type = parsed
        .frontmatter
        .get("type")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("archival")
        .to_string();
    (title, note_type)
}

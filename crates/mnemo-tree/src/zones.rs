//! Zones: named policies over key prefixes.
//!
//! A zone matches a key when the key equals its prefix or starts with
//! `prefix + "."`. Zones live in memory only; they are not persisted.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

/// A named policy over a key prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    /// Zone name.
    pub name: String,

    /// Key prefix this zone governs.
    pub key_prefix: String,

    /// Maximum number of files under the prefix directory.
    #[serde(default)]
    pub max_items: Option<usize>,

    /// Maximum key depth below the prefix.
    #[serde(default)]
    pub max_depth: Option<usize>,

    /// Default `type` applied to new metadata.
    #[serde(default)]
    pub default_type: Option<String>,

    /// Default `half_life_days` applied to new metadata.
    #[serde(default)]
    pub default_half_life_days: Option<f64>,
}

impl Zone {
    /// Whether this zone governs `key`.
    pub fn matches(&self, key: &str) -> bool {
        key == self.key_prefix || key.starts_with(&format!("{}.", self.key_prefix))
    }

    /// Key depth below the prefix: `core.a.b` is depth 2 in zone `core`.
    pub fn relative_depth(&self, key: &str) -> usize {
        if key == self.key_prefix {
            return 0;
        }
        key[self.key_prefix.len() + 1..].split('.').count()
    }
}

/// Usage statistics for one zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneStats {
    pub name: String,
    pub key_prefix: String,

    /// Current file count under the prefix directory.
    pub items: usize,
    pub max_items: Option<usize>,
    pub max_depth: Option<usize>,
}

/// In-memory registry of zones, keyed by name.
#[derive(Default)]
pub struct ZoneRegistry {
    zones: Mutex<HashMap<String, Zone>>,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or replace a zone by name.
    pub fn define(&self, zone: Zone) {
        self.zones.lock().unwrap().insert(zone.name.clone(), zone);
    }

    /// The zone governing `key`, if any. When several prefixes match, the
    /// longest wins.
    pub fn matching(&self, key: &str) -> Option<Zone> {
        self.zones
            .lock()
            .unwrap()
            .values()
            .filter(|z| z.matches(key))
            .max_by_key(|z| z.key_prefix.len())
            .cloned()
    }

    /// All defined zones, ordered by name.
    pub fn list(&self) -> Vec<Zone> {
        let mut zones: Vec<Zone> = self.zones.lock().unwrap().values().cloned().collect();
        zones.sort_by(|a, b| a.name.cmp(&b.name));
        zones
    }
}

/// Count `.md` files under a zone's prefix directory.
pub fn count_zone_items(root: &Path, key_prefix: &str) -> usize {
    let mut dir = root.to_path_buf();
    for segment in key_prefix.split('.') {
        dir.push(segment);
    }
    if !dir.is_dir() {
        return 0;
    }

    WalkDir::new(&dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file()
                && e.path().extension().and_then(|x| x.to_str()) == Some("md")
        })
        .count()
}

//! mnemo-tree - hierarchical memory facade
//!
//! Maps dotted keys onto Markdown files under a memory root, serializes
//! writes per key, enforces zone policies, and applies half-life decay to
//! search results.

pub mod keys;
mod locks;
mod memory;
mod view;
pub mod zones;

pub use locks::KeyLocks;
pub use memory::{apply_half_life, MemoryNote, MemoryTree};
pub use view::{NodeKind, TreeEntry, TreeNode};
pub use zones::{Zone, ZoneStats};

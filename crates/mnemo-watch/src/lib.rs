//! mnemo-watch - file-system watching and the auto-embed loop
//!
//! At most one watcher runs per store. File events are debounced per path,
//! and a self-re-arming scan loop embeds pending content without ever
//! overlapping itself.

mod watcher;

pub use watcher::{embed_pass, AutoEmbedWatcher, WatchState};

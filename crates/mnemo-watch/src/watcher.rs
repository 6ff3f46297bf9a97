//! File-system watcher with per-event debounce and a self-scheduling scan
//! loop.
//!
//! The notify debouncer provides write-settled detection (a file must stop
//! changing for the settle window before an event fires). On top of that, a
//! per-path coalescing timer absorbs bursts: re-arming a path aborts its
//! previous timer, so there is no unbounded timer growth. The scan loop
//! re-arms itself after each pass completes, never on a fixed rate, so a
//! slow embed pass cannot overlap the next one.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use mnemo_core::{Collection, Result, WatcherConfig};
use mnemo_embed::Embedder;
use mnemo_index::Indexer;
use mnemo_store::Store;

/// Watcher lifecycle: `Idle → Watching ⇄ Scanning → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching,
    Scanning,
    Stopped,
}

/// Watches collection roots and keeps embeddings current.
pub struct AutoEmbedWatcher {
    store: Arc<Store>,
    indexer: Arc<Indexer>,
    embedder: Arc<Embedder>,
    config: WatcherConfig,

    state: Arc<Mutex<WatchState>>,
    debounce: Arc<Mutex<HashMap<PathBuf, (u64, JoinHandle<()>)>>>,
    next_gen: Arc<AtomicU64>,
    scan_task: Mutex<Option<JoinHandle<()>>>,
    event_task: Mutex<Option<JoinHandle<()>>>,
    debouncer: Mutex<Option<Debouncer<RecommendedWatcher>>>,
}

impl AutoEmbedWatcher {
    pub fn new(
        store: Arc<Store>,
        indexer: Arc<Indexer>,
        embedder: Arc<Embedder>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            store,
            indexer,
            embedder,
            config,
            state: Arc::new(Mutex::new(WatchState::Idle)),
            debounce: Arc::new(Mutex::new(HashMap::new())),
            next_gen: Arc::new(AtomicU64::new(0)),
            scan_task: Mutex::new(None),
            event_task: Mutex::new(None),
            debouncer: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WatchState {
        *self.state.lock().unwrap()
    }

    /// Start watching every collection root and arm the scan loop.
    ///
    /// Calling `start` while already watching is a warning no-op.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                WatchState::Watching | WatchState::Scanning => {
                    warn!("Watcher already running; start ignored");
                    return Ok(());
                }
                _ => *state = WatchState::Watching,
            }
        }

        let collections = self.store.list_collections().await?;
        let root_count = collections.len();

        let (notify_tx, notify_rx) = std::sync::mpsc::channel();
        let mut debouncer = new_debouncer(
            Duration::from_millis(self.config.settle_ms),
            notify_tx,
        )
        .map_err(|e| {
            mnemo_core::MnemoError::internal(format!("Failed to create file watcher: {}", e))
        })?;

        for collection in &collections {
            if collection.root.exists() {
                if let Err(e) = debouncer
                    .watcher()
                    .watch(&collection.root, RecursiveMode::Recursive)
                {
                    warn!("Failed to watch {:?}: {}", collection.root, e);
                } else {
                    debug!("Watching {:?}", collection.root);
                }
            } else {
                debug!("Skipping non-existent root {:?}", collection.root);
            }
        }

        // Bridge the notify thread into tokio
        let (event_tx, mut event_rx) = mpsc::channel::<PathBuf>(256);
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                let result: DebounceEventResult = result;
                match result {
                    Ok(events) => {
                        for event in events {
                            if event_tx.blocking_send(event.path).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => warn!("File watcher error: {:?}", e),
                }
            }
        });

        // Consume events, coalescing per path
        let watcher = self.clone();
        let event_task = tokio::spawn(async move {
            while let Some(path) = event_rx.recv().await {
                let Some(collection) = watcher.collection_for(&collections, &path) else {
                    continue;
                };
                watcher.schedule_debounce(path, collection);
            }
        });

        // Self-scheduling scan loop: sleep re-arms only after a pass ends
        let watcher = self.clone();
        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        let scan_task = tokio::spawn(async move {
            loop {
                watcher.run_scan_pass().await;
                if watcher.state() == WatchState::Stopped {
                    break;
                }
                tokio::time::sleep(interval).await;
            }
        });

        *self.debouncer.lock().unwrap() = Some(debouncer);
        *self.event_task.lock().unwrap() = Some(event_task);
        *self.scan_task.lock().unwrap() = Some(scan_task);

        info!(
            "Watcher started: {} roots, {}s interval, {}ms debounce",
            root_count, self.config.interval_secs, self.config.debounce_ms
        );
        Ok(())
    }

    /// Stop watching. Idempotent; synchronously cancels the scan loop and
    /// every pending debounce timer.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == WatchState::Stopped {
                return;
            }
            *state = WatchState::Stopped;
        }

        if let Some(task) = self.scan_task.lock().unwrap().take() {
            task.abort();
        }
        if let Some(task) = self.event_task.lock().unwrap().take() {
            task.abort();
        }

        let mut pending = self.debounce.lock().unwrap();
        for (_, (_, handle)) in pending.drain() {
            handle.abort();
        }
        drop(pending);

        // Dropping the debouncer ends the notify thread; the bridge thread
        // follows when its channel closes
        *self.debouncer.lock().unwrap() = None;

        info!("Watcher stopped");
    }

    fn collection_for(&self, collections: &[Collection], path: &PathBuf) -> Option<Collection> {
        collections
            .iter()
            .filter(|c| path.starts_with(&c.root))
            .max_by_key(|c| c.root.as_os_str().len())
            .cloned()
    }

    /// Arm (or re-arm) the coalescing timer for one path.
    fn schedule_debounce(self: &Arc<Self>, path: PathBuf, collection: Collection) {
        let generation = self.next_gen.fetch_add(1, Ordering::SeqCst);
        let delay = Duration::from_millis(self.config.debounce_ms);

        let watcher = self.clone();
        let task_path = path.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            debug!("Debounce fired for {:?}", task_path);
            if let Err(e) = watcher
                .indexer
                .index_collection(&collection, true)
                .await
            {
                warn!("Event-driven reindex of {} failed: {}", collection.name, e);
            }
            if let Err(e) = embed_pass(&watcher.store, &watcher.embedder).await {
                warn!("Event-driven embed pass failed: {}", e);
            }

            // Drop our own registration unless a newer timer replaced it
            let mut pending = watcher.debounce.lock().unwrap();
            if pending.get(&task_path).map(|(g, _)| *g) == Some(generation) {
                pending.remove(&task_path);
            }
        });

        let mut pending = self.debounce.lock().unwrap();
        if let Some((_, old)) = pending.insert(path, (generation, handle)) {
            old.abort();
        }
    }

    /// One periodic pass: incremental reindex, then embed pending content.
    async fn run_scan_pass(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if *state != WatchState::Watching {
                return;
            }
            *state = WatchState::Scanning;
        }

        if let Err(e) = self.indexer.reindex(true).await {
            warn!("Periodic reindex failed: {}", e);
        }
        match embed_pass(&self.store, &self.embedder).await {
            Ok(0) => {}
            Ok(n) => debug!("Embedded {} pending documents", n),
            Err(e) => warn!("Periodic embed pass failed: {}", e),
        }

        let mut state = self.state.lock().unwrap();
        if *state == WatchState::Scanning {
            *state = WatchState::Watching;
        }
    }
}

/// Embed every pending content hash in order, one at a time.
///
/// Single-chunk policy: the whole document becomes one vector at seq 0.
/// Per-hash failures are logged and skipped; the pass continues.
pub async fn embed_pass(store: &Store, embedder: &Embedder) -> Result<usize> {
    if !store.vec_enabled() {
        debug!("Vector table unavailable; skipping embed pass");
        return Ok(0);
    }

    let pending = store.hashes_for_embedding().await?;
    if pending.is_empty() {
        return Ok(0);
    }

    let model = embedder.model_name();
    let mut inserted = 0usize;

    for item in pending {
        let Some(body) = store.get_body(&item.content_hash).await? else {
            continue;
        };
        match embedder.embed_document(&body).await {
            Ok(vector) => {
                match store
                    .insert_embedding(&item.content_hash, 0, 0, &model, &vector)
                    .await
                {
                    Ok(()) => inserted += 1,
                    Err(e) => warn!(
                        "Failed to store vector for {} ({}): {}",
                        item.content_hash, item.probe_path, e
                    ),
                }
            }
            Err(e) => warn!(
                "Failed to embed {} ({}): {}",
                item.content_hash, item.probe_path, e
            ),
        }
    }

    Ok(inserted)
}

//! Keyed table of live per-object streaming-watcher control handles (C5).
//!
//! The registry is the owner of watcher lifecycle state; supervisors (C6)
//! hold only their own [`ObjectKey`] and re-look themselves up here rather
//! than keeping a strong back-reference, which is what keeps the
//! registry/watcher relationship acyclic (see design note in SPEC_FULL.md §9).

use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::types::ObjectKey;

/// Live watcher state for one object.
pub struct EventWatcherMeta {
    pub last_generation: i64,
    pub last_client_id: String,
    pub cancel: CancellationToken,
    pub stopped_rx: oneshot::Receiver<()>,
}

impl EventWatcherMeta {
    /// Whether a new `ensure_watcher` call for this generation/client would
    /// be a no-op against the currently registered watcher.
    pub fn matches(&self, generation: i64, client_id: &str) -> bool {
        self.last_generation == generation && self.last_client_id == client_id
    }
}

#[derive(Default)]
pub struct WatcherRegistry {
    entries: RwLock<HashMap<ObjectKey, EventWatcherMeta>>,
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly launched watcher, replacing any previous entry.
    /// Callers must have already ensured the previous entry's `stopped_rx`
    /// closed (or the stop-wait timeout elapsed) before calling this.
    pub fn register(&self, key: ObjectKey, meta: EventWatcherMeta) {
        self.entries.write().insert(key, meta);
    }

    pub fn remove(&self, key: &ObjectKey) -> Option<EventWatcherMeta> {
        self.entries.write().remove(key)
    }

    pub fn is_current(&self, key: &ObjectKey, generation: i64, client_id: &str) -> bool {
        self.entries
            .read()
            .get(key)
            .map(|meta| meta.matches(generation, client_id))
            .unwrap_or(false)
    }

    pub fn cancel_token(&self, key: &ObjectKey) -> Option<CancellationToken> {
        self.entries.read().get(key).map(|meta| meta.cancel.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

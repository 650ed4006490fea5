//! Event Dispatcher (C7): an optional variant of C6 where a single shared
//! connection fans out per-listener channels, used where all listeners
//! share one upstream identity.
//!
//! Generalizes the teacher's `reflector::dispatcher::Dispatcher<K>` (which
//! fans out `ObjectRef<K>` to `Store`-backed subscribers) to fan out raw
//! [`EventFrame`]s instead, since C7 has no typed store to resolve through.

use async_broadcast::{InactiveReceiver, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::upstream::{EventConnection, EventFrame};

/// Fan-out of a single upstream connection's frames to any number of
/// listeners, each buffered to `capacity`. Frames are dropped for a listener
/// whose buffer is full rather than applying backpressure to the shared
/// read loop.
pub struct Dispatcher {
    tx: Sender<EventFrame>,
    _inactive_rx: InactiveReceiver<EventFrame>,
}

impl Dispatcher {
    pub fn new(capacity: usize) -> Self {
        let (mut tx, rx) = async_broadcast::broadcast(capacity);
        tx.set_overflow(true);
        Self {
            tx,
            _inactive_rx: rx.deactivate(),
        }
    }

    /// Registers a new listener; returns a receiver of every subsequent
    /// frame broadcast on this dispatcher.
    pub fn register(&self) -> Receiver<EventFrame> {
        self.tx.new_receiver()
    }

    async fn broadcast(&self, frame: EventFrame) {
        let _ = self.tx.broadcast(frame).await;
    }
}

/// The process-wide dispatcher slot. Kept as an explicitly injected
/// singleton (constructed once, handed to callers) rather than a bare
/// `static mut`, per the redesign note on global mutable state.
static GLOBAL_DISPATCHER: OnceLock<Mutex<Option<std::sync::Arc<Dispatcher>>>> = OnceLock::new();

fn slot() -> &'static Mutex<Option<std::sync::Arc<Dispatcher>>> {
    GLOBAL_DISPATCHER.get_or_init(|| Mutex::new(None))
}

/// Installs a new shared dispatcher, replacing the previous one. Callers
/// must have already stopped the previous dispatcher's read loop before
/// replacing it, per the shared-resource policy.
pub fn install(dispatcher: std::sync::Arc<Dispatcher>) {
    *slot().lock() = Some(dispatcher);
}

pub fn current() -> Option<std::sync::Arc<Dispatcher>> {
    slot().lock().clone()
}

pub fn clear() {
    *slot().lock() = None;
}

/// Drives a shared connection's read loop until it errors or is told to
/// stop externally (by the connection itself returning an error), then
/// clears the global slot.
pub async fn run_fanout(dispatcher: std::sync::Arc<Dispatcher>, mut conn: Box<dyn EventConnection>) {
    loop {
        match conn.read_frame().await {
            Ok(frame) => dispatcher.broadcast(frame).await,
            Err(e) => {
                warn!(error = %e, "shared dispatcher connection failed, closing listeners");
                break;
            }
        }
    }
    debug!("shared dispatcher read loop exiting");
    conn.close().await;
    clear();
}

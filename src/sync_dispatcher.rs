//! Sync Work Dispatcher (C9): a rate-limited work queue over N workers for
//! sync requests originating outside reconcile loops.
//!
//! Grounded on the semaphore/`Notify`-gated worker pool in the corpus's
//! renewal scheduler and on `controller::runner::Runner`'s
//! single-in-flight-per-key discipline, reimplemented here over
//! `async-channel` plus a per-key in-flight guard rather than the teacher's
//! `pin_project`-based `Scheduler`/`FutureHashMap` stream machinery.

use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use crate::backoff_registry::BackoffRegistry;
use crate::types::ObjectKey;

#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub target_key: ObjectKey,
    pub delay: Duration,
    pub requeue_on_err: bool,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transient sync failure: {0}")]
    Transient(String),
    #[error("terminal sync failure: {0}")]
    Terminal(String),
}

impl SyncError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncError::Terminal(_))
    }
}

/// What happened after running one sync, and how the dispatcher should
/// follow up.
#[derive(Debug, Default, Clone)]
pub struct SyncOutcome {
    pub requeue_after: Option<Duration>,
    pub requeue: bool,
    pub error: Option<String>,
}

#[async_trait]
pub trait Syncer: Send + Sync {
    async fn sync(&self, req: &SyncRequest) -> Result<SyncOutcome, SyncError>;
}

#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("sync work dispatcher already started")]
    AlreadyStarted,
}

pub struct SyncWorkDispatcher {
    tx: Sender<SyncRequest>,
    rx: Receiver<SyncRequest>,
    in_flight: Arc<Mutex<HashSet<ObjectKey>>>,
    started: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
    max_concurrent_syncs: usize,
    backoffs: Arc<BackoffRegistry>,
    syncer: Arc<dyn Syncer>,
}

impl SyncWorkDispatcher {
    pub fn new(max_concurrent_syncs: usize, backoffs: Arc<BackoffRegistry>, syncer: Arc<dyn Syncer>) -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self {
            tx,
            rx,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            started: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
            max_concurrent_syncs: max_concurrent_syncs.max(1),
            backoffs,
            syncer,
        }
    }

    /// Submits a request. If `delay > 0`, the enqueue is deferred by
    /// spawning a sleep rather than blocking the caller.
    pub fn sync(self: &Arc<Self>, req: SyncRequest) {
        if req.delay.is_zero() {
            let tx = self.tx.clone();
            tokio::spawn(async move {
                let _ = tx.send(req).await;
            });
        } else {
            let tx = self.tx.clone();
            let delay = req.delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(req).await;
            });
        }
    }

    /// Spawns `max_concurrent_syncs` workers. Single-call idempotent: a
    /// second call returns [`DispatcherError::AlreadyStarted`].
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> Result<(), DispatcherError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(DispatcherError::AlreadyStarted);
        }

        let mut workers = self.workers.lock();
        for worker_id in 0..self.max_concurrent_syncs {
            let dispatcher = self.clone();
            let cancel = cancel.clone();
            workers.push(tokio::spawn(async move {
                dispatcher.run_worker(worker_id, cancel).await;
            }));
        }
        Ok(())
    }

    /// Awaits every worker spawned by `start`, so callers cancelling the
    /// token know the in-flight syncs have actually drained before tearing
    /// down shared state underneath them.
    pub async fn wait(&self) {
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn run_worker(self: Arc<Self>, worker_id: usize, cancel: CancellationToken) {
        loop {
            let req = tokio::select! {
                _ = cancel.cancelled() => break,
                req = self.rx.recv() => match req {
                    Ok(req) => req,
                    Err(_) => break,
                },
            };

            if !self.in_flight.lock().insert(req.target_key.clone()) {
                // Another worker already owns this key; requeue rather than
                // run two syncs for the same object concurrently.
                self.sync(req);
                continue;
            }

            let sync_id = Uuid::new_v4();
            let span = info_span!("sync_work_dispatcher", worker_id, %sync_id, key = %req.target_key);
            self.run_one(req.clone()).instrument(span).await;

            self.in_flight.lock().remove(&req.target_key);
        }
    }

    async fn run_one(self: &Arc<Self>, req: SyncRequest) {
        match self.syncer.sync(&req).await {
            Ok(outcome) => {
                self.backoffs.delete(&req.target_key);
                if let Some(after) = outcome.requeue_after.filter(|d| !d.is_zero()) {
                    self.sync(SyncRequest { delay: after, ..req });
                } else if outcome.requeue {
                    let (delay, _) = self.backoffs.get(&req.target_key);
                    if let Some(delay) = delay {
                        self.sync(SyncRequest { delay, ..req });
                    }
                }
            }
            Err(err) => {
                warn!(key = %req.target_key, error = %err, "sync failed");
                if req.requeue_on_err && !err.is_terminal() {
                    let (delay, _) = self.backoffs.get(&req.target_key);
                    if let Some(delay) = delay {
                        self.sync(SyncRequest { delay, ..req });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct CountingSyncer {
        calls: AtomicUsize,
        notify: Notify,
    }

    #[async_trait]
    impl Syncer for CountingSyncer {
        async fn sync(&self, _req: &SyncRequest) -> Result<SyncOutcome, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_one();
            Ok(SyncOutcome::default())
        }
    }

    #[tokio::test]
    async fn start_twice_returns_error() {
        let backoffs = Arc::new(BackoffRegistry::new(crate::config::BackoffConfig::default()));
        let syncer = Arc::new(CountingSyncer {
            calls: AtomicUsize::new(0),
            notify: Notify::new(),
        });
        let dispatcher = Arc::new(SyncWorkDispatcher::new(2, backoffs, syncer));
        let cancel = CancellationToken::new();

        dispatcher.start(cancel.clone()).unwrap();
        assert!(matches!(
            dispatcher.start(cancel),
            Err(DispatcherError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn sync_runs_the_request_through_the_syncer() {
        let backoffs = Arc::new(BackoffRegistry::new(crate::config::BackoffConfig::default()));
        let syncer = Arc::new(CountingSyncer {
            calls: AtomicUsize::new(0),
            notify: Notify::new(),
        });
        let dispatcher = Arc::new(SyncWorkDispatcher::new(1, backoffs, syncer.clone()));
        let cancel = CancellationToken::new();
        dispatcher.start(cancel).unwrap();

        dispatcher.sync(SyncRequest {
            target_key: ObjectKey::new("ns", "obj"),
            delay: Duration::ZERO,
            requeue_on_err: false,
        });

        tokio::time::timeout(Duration::from_secs(1), syncer.notify.notified())
            .await
            .unwrap();
        assert_eq!(syncer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wait_returns_once_cancelled_workers_exit() {
        let backoffs = Arc::new(BackoffRegistry::new(crate::config::BackoffConfig::default()));
        let syncer = Arc::new(CountingSyncer {
            calls: AtomicUsize::new(0),
            notify: Notify::new(),
        });
        let dispatcher = Arc::new(SyncWorkDispatcher::new(2, backoffs, syncer));
        let cancel = CancellationToken::new();
        dispatcher.start(cancel.clone()).unwrap();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), dispatcher.wait())
            .await
            .unwrap();
    }
}

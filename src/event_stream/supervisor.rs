//! Event Stream Supervisor (C6): owns the duplex-connection watcher per
//! object, handling reconnect, error threshold, and requeue.
//!
//! The read loop is a cooperative state machine built on `tokio::select!`
//! between the cancellation token and the read future, so the read call is
//! always cancellable — the async analogue of the context-aware read loop
//! the spec requires.

use backoff::backoff::Backoff as _;
use backoff::ExponentialBackoffBuilder;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use super::{ClientRefresh, GenericEvent, InstantUpdateConfig};
use crate::backoff_registry::BackoffRegistry;
use crate::config::SupervisorConfig;
use crate::recorder::{EventRecorder, EventReason, RecordedEvent};
use crate::upstream::{frame_matches, EventConnection, UpstreamError};
use crate::watcher_registry::{EventWatcherMeta, WatcherRegistry};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to open upstream connection: {0}")]
    ConnectFailed(#[from] UpstreamError),
    #[error("superseded watcher did not stop within the wait window")]
    StopWaitTimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SupervisorState {
    Idle,
    Starting,
    Running,
    Reconnecting,
    Stopped,
}

/// Ensures a live watcher exists for `cfg.key` matching `cfg.generation` and
/// `cfg.client.id()`. No-ops if one already does; otherwise supersedes any
/// existing watcher and launches a fresh one.
pub async fn ensure_watcher(
    cfg: InstantUpdateConfig,
    watchers: Arc<WatcherRegistry>,
    backoffs: Arc<BackoffRegistry>,
    recorder: Arc<dyn EventRecorder>,
    emit: mpsc::Sender<GenericEvent>,
    supervisor_cfg: SupervisorConfig,
) -> Result<(), SupervisorError> {
    let client_id = cfg.client.id().to_string();

    if watchers.is_current(&cfg.key, cfg.generation, &client_id) {
        debug!(key = %cfg.key, "watcher already current, skipping restart");
        return Ok(());
    }

    if let Some(cancel) = watchers.cancel_token(&cfg.key) {
        cancel.cancel();
        // The previous entry's stopped_rx lives inside the registry entry we
        // are about to replace; we can't await it directly without removing
        // it, so we remove it here and wait on the handle we pulled out.
        if let Some(mut old) = watchers.remove(&cfg.key) {
            match tokio::time::timeout(supervisor_cfg.stop_wait, &mut old.stopped_rx).await {
                Ok(_) => {}
                Err(_) => {
                    error!(
                        key = %cfg.key,
                        "wait elapsed without stop; abandoning superseded watcher"
                    );
                    return Err(SupervisorError::StopWaitTimedOut);
                }
            }
        }
    }

    let conn = cfg.client.websocket_client(&cfg.path).await?;
    let cancel = CancellationToken::new();
    let (stopped_tx, stopped_rx) = oneshot::channel();

    watchers.register(
        cfg.key.clone(),
        EventWatcherMeta {
            last_generation: cfg.generation,
            last_client_id: client_id,
            cancel: cancel.clone(),
            stopped_rx,
        },
    );

    let span = tracing::info_span!("event_stream_supervisor", namespace = %cfg.key.namespace, name = %cfg.key.name);
    tokio::spawn(
        run_read_loop(
            cfg,
            conn,
            cancel,
            stopped_tx,
            watchers,
            backoffs,
            recorder,
            emit,
            supervisor_cfg,
        )
        .instrument(span),
    );

    Ok(())
}

/// Cancels and deregisters the watcher for `key`, if any.
pub fn unwatch_events(watchers: &WatcherRegistry, key: &crate::types::ObjectKey) {
    if let Some(meta) = watchers.remove(key) {
        meta.cancel.cancel();
    }
}

/// Outcome of racing a generic-event send against cancellation.
enum SendOutcome {
    Sent,
    ChannelClosed,
    Cancelled,
}

/// Sends on `emit`, but gives up as soon as `cancel` fires instead of
/// blocking forever on a receiver that has stopped draining during
/// shutdown.
async fn send_or_cancel(
    emit: &mpsc::Sender<GenericEvent>,
    event: GenericEvent,
    cancel: &CancellationToken,
) -> SendOutcome {
    tokio::select! {
        _ = cancel.cancelled() => SendOutcome::Cancelled,
        res = emit.send(event) => match res {
            Ok(()) => SendOutcome::Sent,
            Err(_) => SendOutcome::ChannelClosed,
        },
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_read_loop(
    cfg: InstantUpdateConfig,
    mut conn: Box<dyn EventConnection>,
    cancel: CancellationToken,
    stopped_tx: oneshot::Sender<()>,
    watchers: Arc<WatcherRegistry>,
    backoffs: Arc<BackoffRegistry>,
    recorder: Arc<dyn EventRecorder>,
    emit: mpsc::Sender<GenericEvent>,
    supervisor_cfg: SupervisorConfig,
) {
    let _ = recorder
        .record(RecordedEvent {
            object: cfg.key.clone(),
            reason: EventReason::EventWatcherStarted,
            note: "started watching upstream event stream".into(),
        })
        .await;

    let mut state = SupervisorState::Running;
    let mut error_count: u32 = 0;
    let mut reconnect_backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(std::time::Duration::from_millis(200))
        .with_max_interval(std::time::Duration::from_secs(30))
        .build();

    'outer: while state == SupervisorState::Running {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(key = %cfg.key, "cancellation requested, exiting read loop");
                break 'outer;
            }
            frame_result = conn.read_frame() => {
                match frame_result {
                    Ok(frame) => {
                        let matched = frame_matches(
                            &frame,
                            cfg.engine,
                            &cfg.mount,
                            &cfg.secret_path,
                            &cfg.namespace,
                        );
                        if matched {
                            info!(key = %cfg.key, "upstream change matched watched object");
                            backoffs.delete(&cfg.key);
                            error_count = 0;
                            reconnect_backoff.reset();
                            match send_or_cancel(&emit, GenericEvent { target: cfg.key.clone() }, &cancel).await {
                                SendOutcome::Sent => {}
                                SendOutcome::ChannelClosed => {
                                    warn!(key = %cfg.key, "generic-event channel closed, stopping watcher");
                                    break 'outer;
                                }
                                SendOutcome::Cancelled => {
                                    debug!(key = %cfg.key, "cancellation requested while emitting event, exiting read loop");
                                    break 'outer;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error_count += 1;
                        warn!(key = %cfg.key, error = %e, error_count, "event stream read error");
                        let _ = recorder
                            .record(RecordedEvent {
                                object: cfg.key.clone(),
                                reason: EventReason::EventWatcherError,
                                note: e.to_string(),
                            })
                            .await;

                        if error_count >= supervisor_cfg.error_threshold {
                            error!(key = %cfg.key, "error threshold exceeded, requeuing and terminating");
                            let _ = send_or_cancel(&emit, GenericEvent { target: cfg.key.clone() }, &cancel).await;
                            break 'outer;
                        }

                        state = SupervisorState::Reconnecting;
                        match cfg.client_refresh.refresh().await {
                            Ok(client) => match client.websocket_client(&cfg.path).await {
                                Ok(new_conn) => {
                                    conn = new_conn;
                                    state = SupervisorState::Running;
                                }
                                Err(reconnect_err) => {
                                    warn!(key = %cfg.key, error = %reconnect_err, "reconnect failed, backing off");
                                    if let Some(delay) = reconnect_backoff.next_backoff() {
                                        tokio::time::sleep(delay).await;
                                    }
                                    state = SupervisorState::Running;
                                }
                            },
                            Err(refresh_err) => {
                                warn!(key = %cfg.key, error = %refresh_err, "client refresh failed, backing off");
                                if let Some(delay) = reconnect_backoff.next_backoff() {
                                    tokio::time::sleep(delay).await;
                                }
                                state = SupervisorState::Running;
                            }
                        }
                    }
                }
            }
        }
    }

    watchers.remove(&cfg.key);
    conn.close().await;
    let _ = stopped_tx.send(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::test_support::RecordingRecorder;
    use crate::upstream::{EventFrame, EventFrameData, EventFrameEvent, EventFrameMetadata, SecretEngineKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    struct ScriptedConnection {
        frames: AsyncMutex<Vec<Result<EventFrame, UpstreamError>>>,
    }

    #[async_trait]
    impl EventConnection for ScriptedConnection {
        async fn read_frame(&mut self) -> Result<EventFrame, UpstreamError> {
            let mut frames = self.frames.lock().await;
            if frames.is_empty() {
                std::future::pending::<()>().await;
                unreachable!()
            }
            frames.remove(0)
        }

        async fn close(&mut self) {}
    }

    struct StubClient {
        id: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl crate::upstream::UpstreamClient for StubClient {
        fn id(&self) -> &str {
            &self.id
        }

        async fn websocket_client(
            &self,
            _path: &str,
        ) -> Result<Box<dyn EventConnection>, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedConnection {
                frames: AsyncMutex::new(vec![]),
            }))
        }
    }

    struct StubRefresh(Arc<dyn crate::upstream::UpstreamClient>);

    #[async_trait]
    impl ClientRefresh for StubRefresh {
        async fn refresh(&self) -> Result<Arc<dyn crate::upstream::UpstreamClient>, UpstreamError> {
            Ok(self.0.clone())
        }
    }

    fn matching_frame() -> EventFrame {
        EventFrame {
            data: EventFrameData {
                event: EventFrameEvent {
                    metadata: EventFrameMetadata {
                        path: "kv/data/app/config".into(),
                        modified: Some("true".into()),
                    },
                },
                namespace: "team-a".into(),
            },
        }
    }

    #[tokio::test]
    async fn ensure_watcher_skips_restart_when_current() {
        let watchers = Arc::new(WatcherRegistry::new());
        let backoffs = Arc::new(BackoffRegistry::new(crate::config::BackoffConfig::default()));
        let recorder: Arc<dyn EventRecorder> = Arc::new(RecordingRecorder::default());
        let (tx, _rx) = mpsc::channel(8);
        let client: Arc<dyn crate::upstream::UpstreamClient> = Arc::new(StubClient {
            id: "client-a".into(),
            calls: AtomicUsize::new(0),
        });

        let cfg = InstantUpdateConfig {
            key: crate::types::ObjectKey::new("team-a", "obj"),
            generation: 1,
            client: client.clone(),
            client_refresh: Arc::new(StubRefresh(client.clone())),
            path: "v1/kv".into(),
            engine: SecretEngineKind::KvV2,
            mount: "kv".into(),
            secret_path: "app/config".into(),
            namespace: "team-a".into(),
        };

        ensure_watcher(
            cfg,
            watchers.clone(),
            backoffs.clone(),
            recorder.clone(),
            tx.clone(),
            SupervisorConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(watchers.len(), 1);
        assert!(watchers.is_current(&crate::types::ObjectKey::new("team-a", "obj"), 1, "client-a"));
    }

    #[test]
    fn matching_frame_fixture_matches_kv_v2() {
        let f = matching_frame();
        assert!(frame_matches(&f, SecretEngineKind::KvV2, "kv", "app/config", "team-a"));
    }
}

//! Event Handler Layer (C8): translates cluster-watch events into
//! reconcile-queue submissions using the reference cache (C3).
//!
//! Grounded on the teacher's `trigger_with`/`trigger_self` translation layer
//! in `controller/mod.rs`, generalized here into a small trait so each
//! handler is a concrete type rather than a closure dispatched by
//! reflection (see the redesign note on cluster-library dispatch).

use rand::Rng;
use std::time::Duration;
use tracing::warn;

use crate::cluster_api::ClusterEvent;
use crate::reference_cache::ReferenceCache;
use crate::sync_registry::SyncRegistry;
use crate::types::{ObjectKey, ResourceKind};

/// A request to run a reconciler for `key` after `delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueRequest {
    pub key: ObjectKey,
    pub delay: Duration,
}

/// Sink the handlers push enqueue requests into. Kept as a trait so
/// handlers don't depend on a concrete queue implementation; C9's work
/// queue is the production implementation.
pub trait EnqueueSink: Send + Sync {
    fn enqueue(&self, request: EnqueueRequest);
}

/// `(ctx, object) -> error` contract: non-`Ok` suppresses enqueue with a
/// logged warning but is not fatal.
pub trait Validator: Send + Sync {
    fn validate(&self, key: &ObjectKey) -> Result<(), String>;
}

pub struct AlwaysValid;
impl Validator for AlwaysValid {
    fn validate(&self, _key: &ObjectKey) -> Result<(), String> {
        Ok(())
    }
}

/// Enqueues every referrer of the triggering object on `Create`/`Update`
/// (when the observed generation changed), and prunes the reference cache
/// on `Delete`.
pub struct RefRequestsHandler<V: Validator = AlwaysValid> {
    pub kind: ResourceKind,
    pub ref_cache: std::sync::Arc<ReferenceCache>,
    pub sync_registry: std::sync::Arc<SyncRegistry>,
    pub validator: V,
    pub max_requeue_after: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct WatchedObject {
    pub key: ObjectKey,
    pub generation: i64,
    pub observed_generation: Option<i64>,
}

impl<V: Validator> RefRequestsHandler<V> {
    pub fn handle(
        &self,
        event: &ClusterEvent<WatchedObject>,
        sink: &impl EnqueueSink,
        rng: &mut impl Rng,
    ) {
        match event {
            ClusterEvent::Create(obj) => self.enqueue_referrers(&obj.key, sink, rng),
            ClusterEvent::Update { old, new } => {
                if old.observed_generation != new.observed_generation {
                    self.enqueue_referrers(&new.key, sink, rng);
                }
            }
            ClusterEvent::Delete(obj) => {
                self.ref_cache.prune(self.kind, &obj.key);
            }
            ClusterEvent::Generic(_) => {}
        }
    }

    fn enqueue_referrers(&self, reference: &ObjectKey, sink: &impl EnqueueSink, rng: &mut impl Rng) {
        for referrer in self.ref_cache.get(self.kind, reference) {
            if let Err(reason) = self.validator.validate(&referrer) {
                warn!(key = %referrer, reason, "validation failed, suppressing enqueue");
                continue;
            }
            self.sync_registry.insert(referrer.clone());
            let delay = jittered_delay(self.max_requeue_after, rng);
            sink.enqueue(EnqueueRequest { key: referrer, delay });
        }
    }
}

/// On `Delete` only, enqueues every owner reference matching `gvk` at a
/// jittered delay.
pub struct OnDeletionRequestHandler {
    pub gvk: String,
    pub max_requeue_after: Duration,
}

impl OnDeletionRequestHandler {
    pub fn handle(
        &self,
        deleted_owner_refs: &[(String, ObjectKey)],
        sink: &impl EnqueueSink,
        rng: &mut impl Rng,
    ) {
        for (gvk, owner_key) in deleted_owner_refs {
            if gvk == &self.gvk {
                let delay = jittered_delay(self.max_requeue_after, rng);
                sink.enqueue(EnqueueRequest {
                    key: owner_key.clone(),
                    delay,
                });
            }
        }
    }
}

/// On `Generic` only, enqueues the event's object with a jittered delay
/// (immediate if `jitter_window` is zero).
pub struct DelayingSyncEventHandler {
    pub jitter_window: Duration,
}

impl DelayingSyncEventHandler {
    pub fn handle(&self, event: &ClusterEvent<WatchedObject>, sink: &impl EnqueueSink, rng: &mut impl Rng) {
        if let ClusterEvent::Generic(obj) = event {
            let delay = jittered_delay(self.jitter_window, rng);
            sink.enqueue(EnqueueRequest {
                key: obj.key.clone(),
                delay,
            });
        }
    }
}

fn jittered_delay(max: Duration, rng: &mut impl Rng) -> Duration {
    if max.is_zero() {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(rng.gen_range(0.0..=max.as_secs_f64()))
    }
}

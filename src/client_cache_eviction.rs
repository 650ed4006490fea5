//! Client-Cache Eviction (C10): finalizer-driven deletion of cached
//! upstream clients tied to authentication identities.
//!
//! The aggregate-and-continue error policy is modeled directly on
//! `kube-runtime::finalizer`'s approach of collecting a single typed error
//! rather than failing fast; open question 1 in SPEC_FULL.md §9 resolves the
//! ambiguous "overwritten error" source behavior as collect-and-continue.

use thiserror::Error;

use crate::recorder::{EventReason, EventRecorder, RecordedEvent};
use crate::types::ObjectKey;

/// A cached upstream-client custom resource, as listed from the cluster.
#[derive(Debug, Clone)]
pub struct CachedClientRef {
    pub key: ObjectKey,
    pub vault_auth_uid: String,
    pub vault_auth_generation: i64,
    pub vault_connection_uid: String,
    pub vault_connection_generation: i64,
}

/// `cache.vault_auth_uid == obj.uid && cache.vault_auth_generation < obj.generation`.
pub fn filter_old_cache_refs_for_auth(
    obj_uid: &str,
    obj_generation: i64,
    cache: &CachedClientRef,
) -> bool {
    cache.vault_auth_uid == obj_uid && cache.vault_auth_generation < obj_generation
}

/// Analogous filter keyed on the VaultConnection identity.
pub fn filter_old_cache_refs_for_conn(
    obj_uid: &str,
    obj_generation: i64,
    cache: &CachedClientRef,
) -> bool {
    cache.vault_connection_uid == obj_uid && cache.vault_connection_generation < obj_generation
}

/// Matches everything; used on delete paths where every cached client tied
/// to the deleted identity must go.
pub fn filter_all(_cache: &CachedClientRef) -> bool {
    true
}

#[derive(Debug, Error)]
pub enum DeleteError {
    #[error("failed to delete cached client {0}: {1}")]
    Failed(ObjectKey, String),
}

#[derive(Debug, Error)]
#[error("{} eviction(s) failed", .0.len())]
pub struct AggregateError(pub Vec<DeleteError>);

/// Deletes every `CachedClientRef` in `candidates` matching `filter`.
/// Not-found deletes are ignored; other failures are collected and returned
/// as a single aggregate error rather than aborting the batch. Emits
/// [`EventReason::VaultClientCacheEviction`] only when two or more evictions
/// happened.
pub async fn evict<F, D>(
    candidates: Vec<CachedClientRef>,
    filter: F,
    delete: D,
    recorder: &dyn EventRecorder,
    trigger_object: &ObjectKey,
) -> (Vec<ObjectKey>, Option<AggregateError>)
where
    F: Fn(&CachedClientRef) -> bool,
    D: Fn(&ObjectKey) -> DeleteOutcome,
{
    let mut evicted = Vec::new();
    let mut errors = Vec::new();

    for candidate in candidates.into_iter().filter(|c| filter(c)) {
        match delete(&candidate.key) {
            DeleteOutcome::Deleted => evicted.push(candidate.key),
            DeleteOutcome::NotFound => {}
            DeleteOutcome::Failed(msg) => {
                errors.push(DeleteError::Failed(candidate.key, msg));
            }
        }
    }

    if evicted.len() > 1 {
        let _ = recorder
            .record(RecordedEvent {
                object: trigger_object.clone(),
                reason: EventReason::VaultClientCacheEviction,
                note: format!("evicted {} cached client(s)", evicted.len()),
            })
            .await;
    }

    let aggregate = if errors.is_empty() {
        None
    } else {
        Some(AggregateError(errors))
    };
    (evicted, aggregate)
}

/// Synchronous delete result, since the cluster-API call itself is the
/// caller's concern; this module only decides what to do with the outcome.
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    Failed(String),
}

//! Shared resource protocol rules (C11): finalizer bookkeeping, condition
//! merging, and deterministic shadow-object naming.
//!
//! The finalizer state machine is modeled directly on the four
//! `has_finalizer × is_deleting` combinations the teacher's own
//! `finalizer()` helper switches on, generalized from a single hardcoded
//! finalizer string to any caller-supplied one.

use sha2::{Digest, Sha256};
use thiserror::Error;

pub use crate::types::{merge_conditions, Condition, ConditionStatus};

const MAX_SHADOW_NAME_LEN: usize = 63;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FinalizerError {
    #[error("object has no name")]
    UnnamedObject,
    #[error("finalizer string must not be empty")]
    InvalidFinalizer,
}

/// Pure description of an object's finalizer + deletion state, computed by
/// the caller from its cluster representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizerState {
    pub has_finalizer: bool,
    pub is_deleting: bool,
}

impl FinalizerState {
    pub fn for_object(finalizers: &[String], finalizer: &str, is_deleting: bool) -> Self {
        Self {
            has_finalizer: finalizers.iter().any(|f| f == finalizer),
            is_deleting,
        }
    }
}

/// What the caller should do next, given a [`FinalizerState`]. The caller is
/// responsible for actually persisting the finalizer list change and running
/// cleanup; this function only decides which action applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerAction {
    /// Not deleting, finalizer already present: no-op.
    Noop,
    /// Not deleting, finalizer absent: add it and persist.
    AddFinalizer,
    /// Deleting, finalizer present: run cleanup, then remove the finalizer.
    RunCleanupThenRemove,
    /// Deleting, finalizer already absent: nothing left to do.
    AlreadyCleanedUp,
}

pub fn decide_finalizer_action(
    finalizer: &str,
    state: FinalizerState,
) -> Result<FinalizerAction, FinalizerError> {
    if finalizer.is_empty() {
        return Err(FinalizerError::InvalidFinalizer);
    }
    Ok(match (state.is_deleting, state.has_finalizer) {
        (false, true) => FinalizerAction::Noop,
        (false, false) => FinalizerAction::AddFinalizer,
        (true, true) => FinalizerAction::RunCleanupThenRemove,
        (true, false) => FinalizerAction::AlreadyCleanedUp,
    })
}

/// Deterministic "shadow" object name: `<prefix>-<hash(namespace-name)>`,
/// guaranteed to be at most 63 characters (the Kubernetes object name
/// limit). Equal inputs always produce equal outputs.
pub fn make_shadow_name(prefix: &str, namespace: &str, name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b"-");
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    let hex_digest = hex::encode(digest);

    let budget = MAX_SHADOW_NAME_LEN.saturating_sub(prefix.len() + 1);
    let truncated = &hex_digest[..budget.min(hex_digest.len())];
    let full = format!("{prefix}-{truncated}");
    full.chars().take(MAX_SHADOW_NAME_LEN).collect()
}

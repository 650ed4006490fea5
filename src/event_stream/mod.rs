//! Per-object push-based invalidation from the upstream event stream (C6/C7).

pub mod dispatcher;
pub mod supervisor;

use async_trait::async_trait;
use std::sync::Arc;

use crate::types::ObjectKey;
use crate::upstream::{SecretEngineKind, UpstreamClient, UpstreamError};

/// A message re-driving reconciliation for a watcher-terminated object. Each
/// carries a synthetic object with the target `(namespace, name)` and a
/// cleared resource-version, matching the generic emit channel contract.
#[derive(Debug, Clone)]
pub struct GenericEvent {
    pub target: ObjectKey,
}

/// Factory re-minting an [`UpstreamClient`] on reconnect, generalized from
/// the teacher's `NewClientFunc` closure into a trait so it can be
/// constructor-injected rather than captured as global state.
#[async_trait]
pub trait ClientRefresh: Send + Sync {
    async fn refresh(&self) -> Result<Arc<dyn UpstreamClient>, UpstreamError>;
}

/// Per-object watcher spec: everything [`supervisor::ensure_watcher`] needs
/// to open and maintain one subscription.
pub struct InstantUpdateConfig {
    pub key: ObjectKey,
    pub generation: i64,
    pub client: Arc<dyn UpstreamClient>,
    pub client_refresh: Arc<dyn ClientRefresh>,
    pub path: String,
    pub engine: SecretEngineKind,
    pub mount: String,
    pub secret_path: String,
    pub namespace: String,
}

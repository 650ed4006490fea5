//! Reconciliation and renewal scheduling engine shared by every
//! resource-specific reconciler in the secrets-sync operator.
//!
//! This crate owns the hard concurrency and scheduling problems — jittered
//! renewal horizons, a push-based event stream supervisor, a concurrent
//! reference graph, and a rate-limited work dispatcher — and exposes them
//! behind small trait boundaries (`cluster_api`, `upstream`, `recorder`) so
//! it never depends on a concrete cluster client or CRD type.

#![deny(unsafe_code)]

pub mod backoff_registry;
pub mod client_cache_eviction;
pub mod cluster_api;
pub mod config;
pub mod event_handlers;
pub mod event_stream;
pub mod horizon;
pub mod protocol;
pub mod recorder;
pub mod reference_cache;
pub mod sync_dispatcher;
pub mod sync_registry;
pub mod types;
pub mod upstream;
pub mod watcher_registry;

pub use backoff_registry::BackoffRegistry;
pub use client_cache_eviction::evict;
pub use cluster_api::{ClusterApi, ClusterEvent};
pub use config::{BackoffConfig, HorizonConfig, SupervisorConfig};
pub use reference_cache::ReferenceCache;
pub use sync_dispatcher::SyncWorkDispatcher;
pub use sync_registry::SyncRegistry;
pub use types::{ObjectKey, ResourceKind};
pub use watcher_registry::WatcherRegistry;

//! Abstract cluster API boundary (external interface, §6).
//!
//! The core never opens sockets or parses watches itself; it consumes this
//! trait, which the surrounding operator implements over its concrete
//! cluster client. Kept intentionally minimal: CRUD plus a status
//! subresource update plus a source-channel event surface.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::types::ObjectKey;

#[derive(Debug, Error)]
pub enum ClusterApiError {
    #[error("object not found: {0}")]
    NotFound(ObjectKey),
    #[error("cluster API request failed: {0}")]
    Request(String),
}

/// Source-channel event surface, generalized over any tagged resource kind
/// rather than a single CRD type, so C8's handlers are written once.
#[derive(Debug, Clone)]
pub enum ClusterEvent<T> {
    Create(T),
    Update { old: T, new: T },
    Delete(T),
    Generic(T),
}

#[async_trait]
pub trait ClusterApi<T>: Send + Sync
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, key: &ObjectKey) -> Result<Option<T>, ClusterApiError>;
    async fn list(&self, namespace: Option<&str>) -> Result<Vec<T>, ClusterApiError>;
    async fn create(&self, object: &T) -> Result<(), ClusterApiError>;
    async fn update(&self, object: &T) -> Result<(), ClusterApiError>;
    async fn update_status(&self, object: &T) -> Result<(), ClusterApiError>;
    async fn delete(&self, key: &ObjectKey) -> Result<(), ClusterApiError>;
}

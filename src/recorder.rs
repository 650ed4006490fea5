//! Event recorder sink (external interface), generalized from the teacher's
//! `events::Recorder`/`events::Event` pair (a single `Api<Event>`-backed
//! struct) into a trait so the core never binds to a concrete cluster
//! client type.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::ObjectKey;

/// The fixed set of reasons the core ever emits an event for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventReason {
    EventWatcherStarted,
    EventWatcherError,
    VaultClientCacheEviction,
    K8sClientError,
    InvalidConfiguration,
    Accepted,
    StatusUpdateError,
    TransitEncryptSuccessful,
    TransitDecryptSuccessful,
    VaultClientConfigError,
    InvalidResourceRef,
}

impl EventReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventReason::EventWatcherStarted => "EventWatcherStarted",
            EventReason::EventWatcherError => "EventWatcherError",
            EventReason::VaultClientCacheEviction => "VaultClientCacheEviction",
            EventReason::K8sClientError => "K8sClientError",
            EventReason::InvalidConfiguration => "InvalidConfiguration",
            EventReason::Accepted => "Accepted",
            EventReason::StatusUpdateError => "StatusUpdateError",
            EventReason::TransitEncryptSuccessful => "TransitEncryptSuccessful",
            EventReason::TransitDecryptSuccessful => "TransitDecryptSuccessful",
            EventReason::VaultClientConfigError => "VaultClientConfigError",
            EventReason::InvalidResourceRef => "InvalidResourceRef",
        }
    }

    /// `Warning` for failure-flavored reasons, `Normal` otherwise.
    pub fn event_type(&self) -> EventType {
        match self {
            EventReason::EventWatcherError
            | EventReason::K8sClientError
            | EventReason::InvalidConfiguration
            | EventReason::StatusUpdateError
            | EventReason::VaultClientConfigError
            | EventReason::InvalidResourceRef => EventType::Warning,
            _ => EventType::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub object: ObjectKey,
    pub reason: EventReason,
    pub note: String,
}

#[derive(Debug, Error)]
#[error("failed to publish event: {0}")]
pub struct RecorderError(pub String);

/// Sink for named events keyed by [`EventReason`]. The core depends only on
/// this trait; the surrounding operator supplies an implementation backed by
/// its cluster client.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, event: RecordedEvent) -> Result<(), RecorderError>;
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub struct RecordingRecorder {
        pub events: Mutex<Vec<RecordedEvent>>,
    }

    #[async_trait]
    impl EventRecorder for RecordingRecorder {
        async fn record(&self, event: RecordedEvent) -> Result<(), RecorderError> {
            self.events.lock().push(event);
            Ok(())
        }
    }
}

//! Upstream provider client and event-stream frame types (external
//! interfaces, §6). The core consumes `UpstreamClient`/`EventConnection` as
//! trait objects; it never negotiates auth or speaks the wire protocol
//! itself.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to open event stream: {0}")]
    ConnectFailed(String),
    #[error("event stream read failed: {0}")]
    ReadFailed(String),
}

/// A single JSON frame as delivered by the event stream transport:
/// `{"data":{"event":{"metadata":{"path","modified"}},"namespace"}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct EventFrame {
    pub data: EventFrameData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventFrameData {
    pub event: EventFrameEvent,
    pub namespace: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventFrameEvent {
    pub metadata: EventFrameMetadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventFrameMetadata {
    pub path: String,
    /// Transported as a stringified bool (`"true"`/`"false"`), absent means
    /// "not modified".
    pub modified: Option<String>,
}

impl EventFrame {
    /// Whether this frame represents an actual modification worth acting on.
    pub fn is_modified(&self) -> bool {
        matches!(self.data.event.metadata.modified.as_deref(), Some("true"))
    }
}

fn strip_slashes(s: &str) -> &str {
    s.trim_matches('/')
}

/// The mount/path shape a watched object's spec resolves to, used to compare
/// against an incoming frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretEngineKind {
    KvV1,
    KvV2,
    Dynamic,
}

/// Builds the expected `(namespace, path)` pair from an object's spec and
/// checks it against an incoming frame, per §4.4's matching rules. Leading
/// and trailing slashes are insignificant on both sides.
pub fn frame_matches(
    frame: &EventFrame,
    engine: SecretEngineKind,
    mount: &str,
    secret_path: &str,
    namespace: &str,
) -> bool {
    if !frame.is_modified() {
        return false;
    }

    let expected_path = match engine {
        SecretEngineKind::KvV2 => format!("{mount}/data/{secret_path}"),
        SecretEngineKind::KvV1 | SecretEngineKind::Dynamic => format!("{mount}/{secret_path}"),
    };

    strip_slashes(&frame.data.event.metadata.path) == strip_slashes(&expected_path)
        && strip_slashes(&frame.data.namespace) == strip_slashes(namespace)
}

/// A live duplex connection to the upstream event stream.
#[async_trait]
pub trait EventConnection: Send {
    /// Reads the next frame, or an error if the connection failed. Must be
    /// cancel-safe: callers race this against a cancellation token.
    async fn read_frame(&mut self) -> Result<EventFrame, UpstreamError>;
    /// Closes the connection using the transport's normal-closure signal.
    async fn close(&mut self);
}

/// The upstream provider client. Identity equality via `id()` is
/// authoritative for watcher-replacement decisions in C6.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    fn id(&self) -> &str;
    async fn websocket_client(
        &self,
        path: &str,
    ) -> Result<Box<dyn EventConnection>, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(path: &str, namespace: &str, modified: Option<&str>) -> EventFrame {
        EventFrame {
            data: EventFrameData {
                event: EventFrameEvent {
                    metadata: EventFrameMetadata {
                        path: path.to_string(),
                        modified: modified.map(str::to_string),
                    },
                },
                namespace: namespace.to_string(),
            },
        }
    }

    #[test]
    fn scenario_5_event_match_kv_v2() {
        let f = frame("kv/data/app/config", "/team-a", Some("true"));
        assert!(frame_matches(&f, SecretEngineKind::KvV2, "kv", "app/config", "team-a"));
    }

    #[test]
    fn scenario_6_event_match_kv_v1_mismatch() {
        let f = frame("kv/data/app/config", "/team-a", Some("true"));
        assert!(!frame_matches(&f, SecretEngineKind::KvV1, "kv", "app/config", "team-a"));
    }

    #[test]
    fn unmodified_frame_never_matches() {
        let f = frame("kv/data/app/config", "team-a", None);
        assert!(!frame_matches(&f, SecretEngineKind::KvV2, "kv", "app/config", "team-a"));
        let f_false = frame("kv/data/app/config", "team-a", Some("false"));
        assert!(!frame_matches(&f_false, SecretEngineKind::KvV2, "kv", "app/config", "team-a"));
    }
}

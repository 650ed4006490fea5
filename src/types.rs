//! Core identity and status types shared by every component.

use chrono::{DateTime, Utc};
use std::fmt;

/// Stable identity of a cluster object: its namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Closed set of CRD kinds the core reasons about. Replaces reflection-based
/// type assertions with a single tagged enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    SecretTransformation,
    VaultStaticSecret,
    VaultDynamicSecret,
    VaultPKISecret,
    HCPVaultSecretsApp,
    VaultAuth,
    VaultAuthGlobal,
    CSISecrets,
    Pod,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::SecretTransformation => "SecretTransformation",
            ResourceKind::VaultStaticSecret => "VaultStaticSecret",
            ResourceKind::VaultDynamicSecret => "VaultDynamicSecret",
            ResourceKind::VaultPKISecret => "VaultPKISecret",
            ResourceKind::HCPVaultSecretsApp => "HCPVaultSecretsApp",
            ResourceKind::VaultAuth => "VaultAuth",
            ResourceKind::VaultAuthGlobal => "VaultAuthGlobal",
            ResourceKind::CSISecrets => "CSISecrets",
            ResourceKind::Pod => "Pod",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single named status condition, mirroring the Kubernetes condition shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Merges an update into an existing condition list per the protocol rules
/// in [`crate::protocol`]. Kept here since `Condition` is a data-model type
/// used well beyond C11.
pub fn merge_conditions(current: &mut Vec<Condition>, update: Condition) {
    if let Some(existing) = current.iter_mut().find(|c| c.type_ == update.type_) {
        let unchanged = existing.status == update.status
            && existing.reason == update.reason
            && existing.message == update.message;
        if unchanged {
            return;
        }
        let keep_transition_time = existing.status == update.status;
        existing.reason = update.reason;
        existing.message = update.message;
        existing.status = update.status;
        if !keep_transition_time {
            existing.last_transition_time = update.last_transition_time;
        }
    } else {
        current.push(update);
    }
}

/// Validity duration plus the computed delay until the next renewal,
/// aggregated across many dynamic-secret instances under one owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextRenewalDetails {
    pub ttl: std::time::Duration,
    pub next_renewal: std::time::Duration,
}

//! Per-object exponential backoff state (C1).
//!
//! Mirrors the per-resource `HashMap<String, BackoffState>` pattern used to
//! keep one object's retry storm from affecting another's, generalized to a
//! registry type with injectable options instead of hardcoded constants.

use backoff::backoff::Backoff as _;
use backoff::ExponentialBackoff;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::BackoffConfig;
use crate::types::ObjectKey;

struct Entry {
    backoff: ExponentialBackoff,
    created_at: Instant,
}

/// Ephemeral per-object backoff state. Entries are created on first failure
/// and deleted by the caller on success; they are never pruned by a
/// background sweep.
pub struct BackoffRegistry {
    cfg: BackoffConfig,
    entries: Mutex<HashMap<ObjectKey, Entry>>,
}

impl BackoffRegistry {
    pub fn new(cfg: BackoffConfig) -> Self {
        Self {
            cfg,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn build_backoff(&self) -> ExponentialBackoff {
        backoff::ExponentialBackoffBuilder::new()
            .with_initial_interval(self.cfg.initial_interval)
            .with_max_interval(self.cfg.max_interval)
            .with_multiplier(self.cfg.multiplier)
            .with_randomization_factor(self.cfg.randomization_factor)
            .with_max_elapsed_time(self.cfg.max_elapsed)
            .build()
    }

    /// Upsert: returns the next backoff delay for `key` and whether the entry
    /// was just created. A `None` delay means the backoff's elapsed cap was
    /// exceeded; callers should treat that as a terminal retry failure.
    pub fn get(&self, key: &ObjectKey) -> (Option<Duration>, bool) {
        let mut entries = self.entries.lock();
        let created = !entries.contains_key(key);
        let entry = entries.entry(key.clone()).or_insert_with(|| Entry {
            backoff: self.build_backoff(),
            created_at: Instant::now(),
        });
        (entry.backoff.next_backoff(), created)
    }

    /// Removes the backoff entry for `key`, typically called by the caller
    /// after a successful attempt.
    pub fn delete(&self, key: &ObjectKey) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Age of the entry if one exists, for diagnostics.
    pub fn age(&self, key: &ObjectKey) -> Option<Duration> {
        self.entries
            .lock()
            .get(key)
            .map(|e| e.created_at.elapsed())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_upserts_and_reports_creation() {
        let registry = BackoffRegistry::new(BackoffConfig::default());
        let key = ObjectKey::new("default", "my-secret");

        let (first, created) = registry.get(&key);
        assert!(created);
        assert!(first.is_some());

        let (second, created_again) = registry.get(&key);
        assert!(!created_again);
        assert!(second.unwrap() >= first.unwrap());
    }

    #[test]
    fn delete_removes_entry_and_reports_presence() {
        let registry = BackoffRegistry::new(BackoffConfig::default());
        let key = ObjectKey::new("default", "my-secret");
        registry.get(&key);
        assert!(registry.delete(&key));
        assert!(!registry.delete(&key));
        assert!(registry.is_empty());
    }

    #[test]
    fn independent_objects_get_independent_state() {
        let registry = BackoffRegistry::new(BackoffConfig::default());
        let a = ObjectKey::new("ns", "a");
        let b = ObjectKey::new("ns", "b");
        registry.get(&a);
        assert_eq!(registry.len(), 1);
        registry.get(&b);
        assert_eq!(registry.len(), 2);
        registry.delete(&a);
        assert_eq!(registry.len(), 1);
    }
}

//! Kind-scoped bidirectional map: referenced object ↔ set of referrers (C3).
//!
//! Guarded by a single reader/writer lock over the whole cache, matching the
//! multi-reader/single-writer discipline the supervisor and store types use
//! elsewhere in this crate. The structure never contains an empty inner map:
//! emptied referent sets are removed, and emptied kind maps are removed.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use crate::types::{ObjectKey, ResourceKind};

#[derive(Default)]
pub struct ReferenceCache {
    inner: RwLock<HashMap<ResourceKind, HashMap<ObjectKey, HashSet<ObjectKey>>>>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces `referrer`'s reference set for `kind`. An empty `refs`
    /// removes the referrer entirely (and the kind, if it becomes empty).
    pub fn set(&self, kind: ResourceKind, referrer: ObjectKey, refs: Vec<ObjectKey>) {
        let mut inner = self.inner.write();
        let kind_map = inner.entry(kind).or_default();

        // Remove the referrer from every referent's set first, then rebuild.
        kind_map.retain(|_, referrers| {
            referrers.remove(&referrer);
            !referrers.is_empty()
        });

        for reference in refs {
            kind_map.entry(reference).or_default().insert(referrer.clone());
        }

        if kind_map.is_empty() {
            inner.remove(&kind);
        }
    }

    /// All referrers of `reference` under `kind`. Order unspecified.
    pub fn get(&self, kind: ResourceKind, reference: &ObjectKey) -> Vec<ObjectKey> {
        self.inner
            .read()
            .get(&kind)
            .and_then(|kind_map| kind_map.get(reference))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Removes every trace of `referrer` under `kind`. Returns whether it
    /// existed anywhere in that kind's map.
    pub fn remove(&self, kind: ResourceKind, referrer: &ObjectKey) -> bool {
        let mut inner = self.inner.write();
        let Some(kind_map) = inner.get_mut(&kind) else {
            return false;
        };
        let mut existed = false;
        kind_map.retain(|_, referrers| {
            if referrers.remove(referrer) {
                existed = true;
            }
            !referrers.is_empty()
        });
        if kind_map.is_empty() {
            inner.remove(&kind);
        }
        existed
    }

    /// Removes `reference` from every referrer's set under `kind`. Returns
    /// the count of referrers that were affected.
    pub fn prune(&self, kind: ResourceKind, reference: &ObjectKey) -> usize {
        let mut inner = self.inner.write();
        let Some(kind_map) = inner.get_mut(&kind) else {
            return 0;
        };
        let removed = kind_map.remove(reference).map(|set| set.len()).unwrap_or(0);
        if kind_map.is_empty() {
            inner.remove(&kind);
        }
        removed
    }

    pub fn keys(&self) -> Vec<ResourceKind> {
        self.inner.read().keys().copied().collect()
    }

    pub fn values(&self, kind: ResourceKind) -> Vec<ObjectKey> {
        self.inner
            .read()
            .get(&kind)
            .map(|kind_map| kind_map.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: &str) -> ObjectKey {
        ObjectKey::new("ns", n)
    }

    #[test]
    fn set_then_get_reflects_membership() {
        let cache = ReferenceCache::new();
        let referrer = key("referrer");
        let a = key("a");
        let b = key("b");
        cache.set(
            ResourceKind::VaultStaticSecret,
            referrer.clone(),
            vec![a.clone(), b.clone()],
        );
        assert_eq!(
            cache.get(ResourceKind::VaultStaticSecret, &a),
            vec![referrer.clone()]
        );
        assert_eq!(
            cache.get(ResourceKind::VaultStaticSecret, &b),
            vec![referrer.clone()]
        );
        assert!(cache
            .get(ResourceKind::VaultStaticSecret, &key("c"))
            .is_empty());
    }

    #[test]
    fn set_replaces_not_appends() {
        let cache = ReferenceCache::new();
        let referrer = key("referrer");
        cache.set(ResourceKind::VaultStaticSecret, referrer.clone(), vec![key("a")]);
        cache.set(ResourceKind::VaultStaticSecret, referrer.clone(), vec![key("b")]);
        assert!(cache
            .get(ResourceKind::VaultStaticSecret, &key("a"))
            .is_empty());
        assert_eq!(
            cache.get(ResourceKind::VaultStaticSecret, &key("b")),
            vec![referrer]
        );
    }

    #[test]
    fn set_with_no_refs_removes_referrer_and_empty_kind() {
        let cache = ReferenceCache::new();
        let referrer = key("referrer");
        cache.set(ResourceKind::VaultStaticSecret, referrer.clone(), vec![key("a")]);
        cache.set(ResourceKind::VaultStaticSecret, referrer.clone(), vec![]);
        assert!(!cache.remove(ResourceKind::VaultStaticSecret, &referrer));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn prune_returns_exact_affected_count() {
        let cache = ReferenceCache::new();
        let a = key("a");
        cache.set(ResourceKind::VaultStaticSecret, key("r1"), vec![a.clone()]);
        cache.set(ResourceKind::VaultStaticSecret, key("r2"), vec![a.clone()]);
        cache.set(ResourceKind::VaultStaticSecret, key("r3"), vec![key("other")]);

        let affected = cache.prune(ResourceKind::VaultStaticSecret, &a);
        assert_eq!(affected, 2);
        assert!(cache.get(ResourceKind::VaultStaticSecret, &a).is_empty());
    }

    #[test]
    fn never_stores_empty_inner_maps() {
        let cache = ReferenceCache::new();
        cache.set(ResourceKind::VaultStaticSecret, key("r1"), vec![key("a")]);
        cache.remove(ResourceKind::VaultStaticSecret, &key("r1"));
        assert!(cache.is_empty());
        assert!(cache.keys().is_empty());
    }
}

//! Set-membership tracker of object keys pending sync (C2).

use parking_lot::Mutex;
use std::collections::HashSet;

use crate::types::ObjectKey;

#[derive(Default)]
pub struct SyncRegistry {
    members: Mutex<HashSet<ObjectKey>>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent insert; returns `true` if the key was newly inserted.
    pub fn insert(&self, key: ObjectKey) -> bool {
        self.members.lock().insert(key)
    }

    /// Returns whether `key` was present before removal.
    pub fn delete(&self, key: &ObjectKey) -> bool {
        self.members.lock().remove(key)
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.members.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent() {
        let registry = SyncRegistry::new();
        let key = ObjectKey::new("ns", "obj");
        assert!(registry.insert(key.clone()));
        assert!(!registry.insert(key.clone()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn delete_reports_prior_presence() {
        let registry = SyncRegistry::new();
        let key = ObjectKey::new("ns", "obj");
        assert!(!registry.delete(&key));
        registry.insert(key.clone());
        assert!(registry.delete(&key));
        assert!(!registry.contains(&key));
    }
}

//! Run-scoped identity cache keyed by business key
//!
//! Maps the natural key of a source record (department name, reader address,
//! employee source id) to the remote entity last seen for it. Indexes are
//! rebuilt from the workforce service at the start of a run and extended in
//! memory as entities are created; nothing is persisted.

use std::collections::HashMap;

use crate::types::SyncEntity;

/// Keyed lookup cache of remote entities
#[derive(Debug, Clone)]
pub struct IdentityIndex<T> {
    entries: HashMap<String, T>,
}

impl<T> Default for IdentityIndex<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: SyncEntity> IdentityIndex<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with `items`
    ///
    /// Items with an empty key are skipped; for duplicate keys the first
    /// occurrence wins.
    pub fn reload<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        self.entries.clear();
        for item in items {
            self.add_if_not_exists(item);
        }
    }

    /// Insert `item` unless its key is empty or already present
    ///
    /// Returns true when the item was inserted.
    pub fn add_if_not_exists(&mut self, item: T) -> bool {
        let key = item.business_key();
        if key.is_empty() || self.entries.contains_key(key) {
            return false;
        }
        self.entries.insert(key.to_string(), item);
        true
    }

    /// Exact-match lookup
    pub fn find(&self, key: &str) -> Option<&T> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#![forbid(unsafe_code)]

use crate::strpool::{StrHandle, StringPool};
use std::collections::HashMap;

/// Unique string-keyed secondary index holding its own pool references.
#[derive(Debug, Default)]
pub struct StrIndex {
    entries: HashMap<StrHandle, u64>,
}

impl StrIndex {
    pub fn get(&self, key: &str) -> Option<u64> {
        self.entries.get(key).copied()
    }

    /// Claim `key` for `id`.
    ///
    /// Returns the current owner when the key is already claimed by another
    /// record; the index is left unchanged in that case.
    pub fn insert(
        &mut self,
        pool: &mut StringPool,
        key: &StrHandle,
        id: u64,
    ) -> Option<u64> {
        if let Some(&owner) = self.entries.get(key.as_str()) {
            return (owner != id).then_some(owner);
        }
        let handle = pool.acquire(key);
        self.entries.insert(handle, id);
        None
    }

    /// Drop `key` if it is owned by `id`.
    pub fn remove(&mut self, pool: &mut StringPool, key: &str, id: u64) -> bool {
        if self.entries.get(key) != Some(&id) {
            return false;
        }
        match self.entries.remove_entry(key) {
            Some((handle, _)) => {
                pool.release(handle);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(key, id)| (key.as_str(), *id))
    }

    pub fn clear(&mut self, pool: &mut StringPool) {
        pool.release_all(self.entries.drain().map(|(handle, _)| handle));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    #[test]
    fn duplicate_keys_keep_first_owner() {
        let mut pool = StringPool::new(Arena::new("strpool", 1 << 16));
        let mut index = StrIndex::default();
        let a = pool.intern("srv").unwrap();

        assert_eq!(index.insert(&mut pool, &a, 1), None);
        assert_eq!(index.insert(&mut pool, &a, 1), None);
        assert_eq!(index.insert(&mut pool, &a, 2), Some(1));
        assert_eq!(pool.refcount("srv"), Some(2));

        assert!(!index.remove(&mut pool, "srv", 2));
        assert!(index.remove(&mut pool, "srv", 1));
        assert_eq!(index.get("srv"), None);
        pool.release(a);
        assert!(pool.is_empty());
    }
}

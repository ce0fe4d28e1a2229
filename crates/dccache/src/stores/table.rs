#![forbid(unsafe_code)]

use crate::{
    Error,
    arena::{Arena, BlockId},
};
use std::collections::{HashMap, hash_map::Entry};

#[derive(Debug)]
struct Slot<V> {
    block: BlockId,
    value: V,
}

/// Records of one entity kind keyed by their database id.
///
/// Every record is charged to the arena while it is cached.
#[derive(Debug)]
pub struct Table<V> {
    arena: Arena,
    rows: HashMap<u64, Slot<V>>,
}

impl<V> Table<V> {
    pub fn new(arena: Arena) -> Self {
        Self {
            arena,
            rows: HashMap::new(),
        }
    }

    /// Look up a record, creating it with `init` when missing.
    ///
    /// The flag is `true` when the record already existed.
    pub fn insert_with(
        &mut self,
        id: u64,
        init: impl FnOnce() -> V,
    ) -> Result<(&mut V, bool), Error> {
        match self.rows.entry(id) {
            Entry::Occupied(slot) => Ok((&mut slot.into_mut().value, true)),
            Entry::Vacant(slot) => {
                let block = self.arena.alloc(std::mem::size_of::<V>())?;
                let slot = slot.insert(Slot {
                    block,
                    value: init(),
                });
                Ok((&mut slot.value, false))
            }
        }
    }

    pub fn remove(&mut self, id: u64) -> Option<V> {
        let slot = self.rows.remove(&id)?;
        self.arena.free(slot.block);
        Some(slot.value)
    }

    pub fn get(&self, id: u64) -> Option<&V> {
        self.rows.get(&id).map(|slot| &slot.value)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut V> {
        self.rows.get_mut(&id).map(|slot| &mut slot.value)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.rows.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &V)> {
        self.rows.iter().map(|(id, slot)| (*id, &slot.value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u64, &mut V)> {
        self.rows.iter_mut().map(|(id, slot)| (*id, &mut slot.value))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.rows.values().map(|slot| &slot.value)
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.rows.keys().copied()
    }

    /// Ids in ascending order, for deterministic iteration.
    pub fn sorted_ids(&self) -> Vec<u64> {
        let mut ids: Vec<_> = self.rows.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reports_found_and_charges_arena() {
        let arena = Arena::new("records", 1 << 16);
        let mut table: Table<u64> = Table::new(arena.clone());

        let (value, found) = table.insert_with(7, || 1).unwrap();
        assert!(!found);
        *value = 2;
        let (value, found) = table.insert_with(7, || 1).unwrap();
        assert!(found);
        assert_eq!(*value, 2);
        assert_eq!(arena.stats().chunks, 1);

        assert_eq!(table.remove(7), Some(2));
        assert_eq!(table.remove(7), None);
        assert_eq!(arena.stats().used, 0);
    }
}

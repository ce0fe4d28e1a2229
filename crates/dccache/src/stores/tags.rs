#![forbid(unsafe_code)]

use super::Table;
use crate::Error;
use crate::arena::Arena;
use crate::domain::Tag;
use crate::strpool::StringPool;
use std::collections::{BTreeSet, HashMap};

/// Tags of one owner kind (hosts, items or triggers).
#[derive(Debug)]
pub struct TagStore {
    tags: Table<Tag>,
    by_owner: HashMap<u64, BTreeSet<u64>>,
}

/// Effect of applying one tag row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TagChange {
    pub changed: bool,
    /// Owner the tag was moved away from.
    pub previous_owner: Option<u64>,
}

impl TagStore {
    pub fn new(arena: Arena) -> Self {
        Self {
            tags: Table::new(arena),
            by_owner: HashMap::new(),
        }
    }

    pub fn upsert(
        &mut self,
        pool: &mut StringPool,
        tagid: u64,
        ownerid: u64,
        tag: &str,
        value: &str,
    ) -> Result<TagChange, Error> {
        let (record, found) = self.tags.insert_with(tagid, || Tag::new(tagid))?;
        let mut change = TagChange {
            changed: !found,
            previous_owner: None,
        };
        if found && record.ownerid != ownerid {
            change.previous_owner = Some(record.ownerid);
            change.changed = true;
        }
        record.ownerid = ownerid;
        change.changed |= pool.replace(found, &mut record.tag, tag)?;
        change.changed |= pool.replace(found, &mut record.value, value)?;

        if let Some(previous) = change.previous_owner {
            self.unindex(previous, tagid);
        }
        self.by_owner.entry(ownerid).or_default().insert(tagid);
        Ok(change)
    }

    /// Remove a tag, returning its owner.
    pub fn remove(&mut self, pool: &mut StringPool, tagid: u64) -> Option<u64> {
        let tag = self.tags.remove(tagid)?;
        self.unindex(tag.ownerid, tagid);
        let ownerid = tag.ownerid;
        pool.release_all([tag.tag, tag.value]);
        Some(ownerid)
    }

    /// Remove every tag of an owner.
    pub fn remove_owner(&mut self, pool: &mut StringPool, ownerid: u64) {
        for tagid in self.by_owner.remove(&ownerid).unwrap_or_default() {
            if let Some(tag) = self.tags.remove(tagid) {
                pool.release_all([tag.tag, tag.value]);
            }
        }
    }

    pub fn for_owner(&self, ownerid: u64) -> impl Iterator<Item = &Tag> {
        self.by_owner
            .get(&ownerid)
            .into_iter()
            .flatten()
            .filter_map(|tagid| self.tags.get(*tagid))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (u64, &Tag)> {
        self.tags.iter()
    }

    fn unindex(&mut self, ownerid: u64, tagid: u64) {
        if let Some(tags) = self.by_owner.get_mut(&ownerid) {
            tags.remove(&tagid);
            if tags.is_empty() {
                self.by_owner.remove(&ownerid);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_a_tag_reindexes_it() {
        let arena = Arena::new("records", 1 << 20);
        let mut pool = StringPool::new(Arena::new("strings", 1 << 20));
        let mut tags = TagStore::new(arena);

        let change = tags.upsert(&mut pool, 1, 10, "env", "prod").unwrap();
        assert!(change.changed);
        let change = tags.upsert(&mut pool, 1, 10, "env", "prod").unwrap();
        assert!(!change.changed);

        let change = tags.upsert(&mut pool, 1, 11, "env", "prod").unwrap();
        assert_eq!(change.previous_owner, Some(10));
        assert_eq!(tags.for_owner(10).count(), 0);
        assert_eq!(tags.for_owner(11).count(), 1);

        assert_eq!(tags.remove(&mut pool, 1), Some(11));
        assert!(pool.is_empty());
    }
}

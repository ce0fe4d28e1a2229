#![forbid(unsafe_code)]

//! Reference-counted string interning over an [`Arena`].
//!
//! Every variable-length string cached anywhere is a [`StrHandle`] obtained
//! from the pool. Handles are deliberately not `Clone`: a second reference
//! is taken with [`StringPool::acquire`] and every handle is given back with
//! [`StringPool::release`].

use crate::{
    Error,
    arena::{Arena, ArenaStats, BlockId},
};
use std::{borrow::Borrow, collections::HashMap, fmt, hash, ops::Deref, sync::Arc};
use tracing::error;

/// Size of the reference counter stored in front of every pooled string.
const REFCOUNT_SIZE: usize = 4;

/// A shared, read-only view of a pooled string.
pub struct StrHandle(Option<Arc<str>>);

impl StrHandle {
    /// A handle that is not backed by the pool. Releasing it is a no-op.
    pub const fn unset() -> Self {
        Self(None)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_deref().unwrap_or("")
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    /// Whether both handles point at the same pool slot.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        match (&a.0, &b.0) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Default for StrHandle {
    fn default() -> Self {
        Self::unset()
    }
}

impl Deref for StrHandle {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for StrHandle {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq for StrHandle {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for StrHandle {}

impl PartialEq<str> for StrHandle {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for StrHandle {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl hash::Hash for StrHandle {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl fmt::Debug for StrHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for StrHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct PoolEntry {
    text: Arc<str>,
    refcount: u32,
    block: BlockId,
}

#[derive(Debug)]
pub struct StringPool {
    arena: Arena,
    entries: HashMap<Arc<str>, PoolEntry>,
}

impl StringPool {
    pub fn new(arena: Arena) -> Self {
        Self {
            arena,
            entries: HashMap::new(),
        }
    }

    pub fn intern(&mut self, text: &str) -> Result<StrHandle, Error> {
        if let Some(entry) = self.entries.get_mut(text) {
            entry.refcount += 1;
            return Ok(StrHandle(Some(entry.text.clone())));
        }

        let block = self.arena.alloc(REFCOUNT_SIZE + text.len() + 1)?;
        let text: Arc<str> = Arc::from(text);
        self.entries.insert(
            text.clone(),
            PoolEntry {
                text: text.clone(),
                refcount: 1,
                block,
            },
        );
        Ok(StrHandle(Some(text)))
    }

    pub fn acquire(&mut self, handle: &StrHandle) -> StrHandle {
        let Some(text) = &handle.0 else {
            return StrHandle::unset();
        };
        match self.entries.get_mut(text.as_ref()) {
            Some(entry) if Arc::ptr_eq(&entry.text, text) => {
                entry.refcount += 1;
                StrHandle(Some(entry.text.clone()))
            }
            _ => {
                error!(text = %text, "acquiring a string that is not owned by the pool");
                StrHandle::unset()
            }
        }
    }

    pub fn release(&mut self, handle: StrHandle) {
        let Some(text) = handle.0 else {
            return;
        };
        let Some(entry) = self.entries.get_mut(text.as_ref()) else {
            error!(text = %text, "releasing a string that is not in the pool");
            return;
        };
        if !Arc::ptr_eq(&entry.text, &text) {
            error!(text = %text, "releasing a string that is not owned by the pool");
            return;
        }
        entry.refcount -= 1;
        if entry.refcount == 0
            && let Some(entry) = self.entries.remove(text.as_ref())
        {
            self.arena.free(entry.block);
        }
    }

    pub fn release_all(&mut self, handles: impl IntoIterator<Item = StrHandle>) {
        for handle in handles {
            self.release(handle);
        }
    }

    /// Refresh a cached string field.
    ///
    /// Returns `false` without touching the pool when `found` is set and the
    /// text is unchanged; otherwise interns `text`, releases the previous
    /// handle and returns `true`.
    pub fn replace(
        &mut self,
        found: bool,
        current: &mut StrHandle,
        text: &str,
    ) -> Result<bool, Error> {
        if found && current.is_set() && current.as_str() == text {
            return Ok(false);
        }
        let fresh = self.intern(text)?;
        let old = std::mem::replace(current, fresh);
        self.release(old);
        Ok(true)
    }

    /// Same as [`replace`](Self::replace) for optional fields where an empty
    /// text means "not set".
    pub fn replace_opt(
        &mut self,
        found: bool,
        current: &mut StrHandle,
        text: &str,
    ) -> Result<bool, Error> {
        if text.is_empty() {
            if !current.is_set() {
                return Ok(false);
            }
            let old = std::mem::take(current);
            self.release(old);
            return Ok(true);
        }
        self.replace(found, current, text)
    }

    pub fn refcount(&self, text: &str) -> Option<u32> {
        self.entries.get(text).map(|entry| entry.refcount)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> ArenaStats {
        self.arena.stats()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries
            .values()
            .map(|entry| (entry.text.as_ref(), entry.refcount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pool() -> StringPool {
        StringPool::new(Arena::new("strpool", 1 << 20))
    }

    #[test]
    fn intern_twice_shares_slot() {
        let mut pool = pool();
        let a = pool.intern("host-a").unwrap();
        let b = pool.intern("host-a").unwrap();
        assert!(StrHandle::ptr_eq(&a, &b));
        assert_eq!(pool.refcount("host-a"), Some(2));

        pool.release(a);
        assert_eq!(pool.refcount("host-a"), Some(1));
        pool.release(b);
        assert_eq!(pool.refcount("host-a"), None);
        assert_eq!(pool.stats().used, 0);
    }

    #[test]
    fn replace_reports_changes() {
        let mut pool = pool();
        let mut field = StrHandle::unset();
        assert!(pool.replace(false, &mut field, "60s").unwrap());
        assert!(!pool.replace(true, &mut field, "60s").unwrap());
        assert_eq!(pool.refcount("60s"), Some(1));

        assert!(pool.replace(true, &mut field, "5m").unwrap());
        assert_eq!(pool.refcount("60s"), None);
        assert_eq!(field.as_str(), "5m");
        pool.release(field);
        assert!(pool.is_empty());
    }

    #[test]
    fn foreign_handles_are_ignored() {
        let mut pool = pool();
        let owned = pool.intern("x").unwrap();
        let mut other = StringPool::new(Arena::new("other", 1 << 10));
        let foreign = other.intern("x").unwrap();

        pool.release(foreign);
        assert_eq!(pool.refcount("x"), Some(1));
        pool.release(StrHandle::unset());
        pool.release(owned);
        assert!(pool.is_empty());
    }

    #[test]
    fn exhausted_pool_fails_intern() {
        let mut pool = StringPool::new(Arena::new("tiny", 32));
        let _a = pool.intern("abc").unwrap();
        assert!(matches!(
            pool.intern("def"),
            Err(Error::OutOfMemory { .. })
        ));
    }

    proptest! {
        #[test]
        fn balanced_acquire_release_empties_pool(words in proptest::collection::vec("[a-c]{0,3}", 1..32)) {
            let mut pool = pool();
            let mut handles = Vec::new();
            for word in &words {
                let handle = pool.intern(word).unwrap();
                handles.push(pool.acquire(&handle));
                handles.push(handle);
            }
            for word in &words {
                prop_assert!(pool.refcount(word).unwrap() >= 2);
            }
            pool.release_all(handles);
            prop_assert!(pool.is_empty());
            prop_assert_eq!(pool.stats().used, 0);
        }
    }
}

#![forbid(unsafe_code)]

use crate::Error;
use crate::strpool::{StrHandle, StringPool};
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug)]
struct PskEntry {
    psk: StrHandle,
    refcount: u32,
}

/// Pre-shared keys by identity, shared between hosts, proxies and
/// auto-registration.
///
/// An identity owns exactly one key. The first owner to register an
/// identity decides its key; later owners with a different key are linked
/// to the existing entry and the mismatch is logged.
#[derive(Debug, Default)]
pub struct PskStore {
    entries: HashMap<StrHandle, PskEntry>,
}

impl PskStore {
    /// Reference the entry for `identity`, creating it with `psk` when
    /// missing. Returns the identity handle the owner keeps.
    pub fn link(
        &mut self,
        pool: &mut StringPool,
        identity: &str,
        psk: &str,
    ) -> Result<StrHandle, Error> {
        if let Some((handle, entry)) = self.entries.get_key_value(identity) {
            if entry.psk.as_str() != psk {
                warn!(
                    identity,
                    "PSK value mismatch for identity already in use, keeping the first value"
                );
            }
            let handle = pool.acquire(handle);
            if let Some(entry) = self.entries.get_mut(identity) {
                entry.refcount += 1;
            }
            return Ok(handle);
        }

        let key = pool.intern(identity)?;
        let psk = match pool.intern(psk) {
            Ok(psk) => psk,
            Err(err) => {
                pool.release(key);
                return Err(err);
            }
        };
        let handle = pool.acquire(&key);
        debug!(identity, "PSK identity added");
        self.entries.insert(key, PskEntry { psk, refcount: 1 });
        Ok(handle)
    }

    /// Drop one owner reference; the entry goes away with its last owner.
    pub fn unlink(&mut self, pool: &mut StringPool, identity: StrHandle) {
        if !identity.is_set() {
            return;
        }
        let remove = match self.entries.get_mut(identity.as_str()) {
            Some(entry) => {
                entry.refcount -= 1;
                entry.refcount == 0
            }
            None => {
                warn!(identity = %identity, "unlinking unknown PSK identity");
                false
            }
        };
        if remove && let Some((key, entry)) = self.entries.remove_entry(identity.as_str()) {
            debug!(identity = %key, "PSK identity removed");
            pool.release(key);
            pool.release(entry.psk);
        }
        pool.release(identity);
    }

    pub fn get(&self, identity: &str) -> Option<&str> {
        self.entries.get(identity).map(|entry| entry.psk.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries
            .iter()
            .map(|(identity, entry)| (identity.as_str(), entry.refcount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    #[test]
    fn first_writer_wins() {
        let mut pool = StringPool::new(Arena::new("strings", 1 << 20));
        let mut store = PskStore::default();

        let a = store.link(&mut pool, "id-1", "aaaa").unwrap();
        let b = store.link(&mut pool, "id-1", "bbbb").unwrap();
        assert_eq!(store.get("id-1"), Some("aaaa"));
        assert_eq!(store.len(), 1);

        store.unlink(&mut pool, a);
        assert_eq!(store.get("id-1"), Some("aaaa"));
        store.unlink(&mut pool, b);
        assert!(store.is_empty());
        assert!(pool.is_empty());
    }
}

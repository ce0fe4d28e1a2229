#![forbid(unsafe_code)]

//! Fixed-budget allocator backing every cached record and string.
//!
//! The arena does not hand out memory itself; it accounts chunks against a
//! byte budget fixed at start-up the way a shared memory segment would, so
//! the whole cache can be sized and monitored as one unit.

use crate::Error;
use humansize::{BINARY, format_size};
use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};
use std::{fmt, sync::Arc};
use tracing::error;

new_key_type! { pub struct BlockId; }

/// Allocation granularity.
pub const ALIGNMENT: u64 = 8;

/// Bookkeeping bytes charged per chunk (size header and footer).
pub const CHUNK_OVERHEAD: u64 = 2 * 8;

#[inline]
pub fn chunk_size(size: usize) -> u64 {
    let size = (size as u64).max(1);
    size.div_ceil(ALIGNMENT) * ALIGNMENT + CHUNK_OVERHEAD
}

#[derive(Debug)]
struct ArenaInner {
    name: &'static str,
    total: u64,
    used: u64,
    peak: u64,
    blocks: SlotMap<BlockId, u64>,
}

impl ArenaInner {
    fn charge(&mut self, bytes: u64) -> Result<(), Error> {
        let free = self.total - self.used;
        if bytes > free {
            return Err(Error::OutOfMemory {
                arena: self.name,
                requested: bytes,
                free,
            });
        }
        self.used += bytes;
        self.peak = self.peak.max(self.used);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub peak: u64,
    pub chunks: usize,
}

impl ArenaStats {
    /// Free space in percent of the total budget.
    pub fn pfree(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.free as f64 * 100.0 / self.total as f64
    }

    pub fn pused(&self) -> f64 {
        100.0 - self.pfree()
    }
}

impl fmt::Display for ArenaStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} used of {} ({:.2}% free, {} chunks, peak {})",
            format_size(self.used, BINARY),
            format_size(self.total, BINARY),
            self.pfree(),
            self.chunks,
            format_size(self.peak, BINARY),
        )
    }
}

/// Shared handle to one arena. Clones account against the same budget.
#[derive(Debug, Clone)]
pub struct Arena(Arc<Mutex<ArenaInner>>);

impl Arena {
    pub fn new(name: &'static str, total: u64) -> Self {
        Self(Arc::new(Mutex::new(ArenaInner {
            name,
            total,
            used: 0,
            peak: 0,
            blocks: SlotMap::with_key(),
        })))
    }

    pub fn name(&self) -> &'static str {
        self.0.lock().name
    }

    pub fn alloc(&self, size: usize) -> Result<BlockId, Error> {
        let bytes = chunk_size(size);
        let mut inner = self.0.lock();
        inner.charge(bytes)?;
        Ok(inner.blocks.insert(bytes))
    }

    /// Resize a block in place. On failure the block keeps its old size.
    pub fn realloc(&self, block: BlockId, size: usize) -> Result<BlockId, Error> {
        let bytes = chunk_size(size);
        let mut inner = self.0.lock();
        let Some(&old) = inner.blocks.get(block) else {
            error!(arena = inner.name, ?block, "realloc of unknown block");
            inner.charge(bytes)?;
            return Ok(inner.blocks.insert(bytes));
        };
        if bytes > old {
            inner.charge(bytes - old)?;
        } else {
            inner.used -= old - bytes;
        }
        if let Some(slot) = inner.blocks.get_mut(block) {
            *slot = bytes;
        }
        Ok(block)
    }

    pub fn free(&self, block: BlockId) {
        let mut inner = self.0.lock();
        match inner.blocks.remove(block) {
            Some(bytes) => inner.used -= bytes,
            None => error!(arena = inner.name, ?block, "free of unknown block"),
        }
    }

    pub fn block_size(&self, block: BlockId) -> Option<u64> {
        self.0.lock().blocks.get(block).copied()
    }

    pub fn stats(&self) -> ArenaStats {
        let inner = self.0.lock();
        ArenaStats {
            total: inner.total,
            used: inner.used,
            free: inner.total - inner.used,
            peak: inner.peak,
            chunks: inner.blocks.len(),
        }
    }
}

/// Variable-length binary value charged to an arena.
#[derive(Debug, Default)]
pub struct Blob {
    block: Option<BlockId>,
    data: Box<[u8]>,
}

impl Blob {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Store `data`, reporting whether the content changed.
    pub fn set(&mut self, arena: &Arena, data: Vec<u8>) -> Result<bool, Error> {
        if *self.data == *data {
            return Ok(false);
        }
        if data.is_empty() {
            self.clear(arena);
            return Ok(true);
        }
        let block = match self.block {
            Some(block) => arena.realloc(block, data.len())?,
            None => arena.alloc(data.len())?,
        };
        self.block = Some(block);
        self.data = data.into_boxed_slice();
        Ok(true)
    }

    pub fn clear(&mut self, arena: &Arena) {
        if let Some(block) = self.block.take() {
            arena.free(block);
        }
        self.data = Box::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn exhaustion_is_an_error() {
        let arena = Arena::new("test", 64);
        let a = arena.alloc(16).unwrap();
        assert_eq!(arena.stats().used, 32);
        let b = arena.alloc(16).unwrap();
        let err = arena.alloc(1).unwrap_err();
        assert!(matches!(err, Error::OutOfMemory { requested: 24, free: 0, .. }));

        arena.free(a);
        arena.free(b);
        assert_eq!(arena.stats().used, 0);
        assert_eq!(arena.stats().peak, 64);
    }

    #[test]
    fn failed_realloc_keeps_block() {
        let arena = Arena::new("test", 64);
        let block = arena.alloc(8).unwrap();
        assert!(arena.realloc(block, 100).is_err());
        assert_eq!(arena.block_size(block), Some(24));

        let block = arena.realloc(block, 40).unwrap();
        assert_eq!(arena.block_size(block), Some(56));
        let block = arena.realloc(block, 1).unwrap();
        assert_eq!(arena.stats().used, 24);
        arena.free(block);
        assert_eq!(arena.stats().chunks, 0);
    }

    #[test]
    fn blob_tracks_its_size() {
        let arena = Arena::new("test", 1024);
        let mut blob = Blob::empty();
        assert!(blob.set(&arena, vec![1, 2, 3]).unwrap());
        assert!(!blob.set(&arena, vec![1, 2, 3]).unwrap());
        assert_eq!(arena.stats().used, 24);
        assert!(blob.set(&arena, vec![0; 20]).unwrap());
        assert_eq!(arena.stats().used, 40);
        blob.clear(&arena);
        assert!(blob.is_empty());
        assert_eq!(arena.stats().used, 0);
    }

    proptest! {
        #[test]
        fn used_matches_live_blocks(sizes in proptest::collection::vec(0usize..512, 1..64)) {
            let arena = Arena::new("prop", u64::MAX / 2);
            let blocks: Vec<_> = sizes.iter().map(|&s| arena.alloc(s).unwrap()).collect();
            let expected: u64 = sizes.iter().map(|&s| chunk_size(s)).sum();
            prop_assert_eq!(arena.stats().used, expected);
            for (i, block) in blocks.into_iter().enumerate() {
                if i % 2 == 0 {
                    arena.free(block);
                }
            }
            let remaining: u64 = sizes.iter().enumerate().filter(|(i, _)| i % 2 == 1).map(|(_, &s)| chunk_size(s)).sum();
            prop_assert_eq!(arena.stats().used, remaining);
        }
    }
}

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::hash::Hash;

/// Binary min-heap whose entries can be updated or removed by key.
#[derive(Debug)]
pub struct IndexedHeap<K, P> {
    entries: Vec<(K, P)>,
    positions: HashMap<K, usize>,
}

impl<K, P> Default for IndexedHeap<K, P> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl<K, P> IndexedHeap<K, P>
where
    K: Copy + Eq + Hash,
    P: Ord + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: K) -> bool {
        self.positions.contains_key(&key)
    }

    pub fn priority(&self, key: K) -> Option<&P> {
        self.positions.get(&key).map(|&pos| &self.entries[pos].1)
    }

    /// Insert `key`, or move it to `priority` when it is already queued.
    pub fn push(&mut self, key: K, priority: P) {
        if let Some(&pos) = self.positions.get(&key) {
            self.entries[pos].1 = priority;
            self.restore(pos);
            return;
        }
        let pos = self.entries.len();
        self.entries.push((key, priority));
        self.positions.insert(key, pos);
        self.sift_up(pos);
    }

    pub fn peek(&self) -> Option<(K, &P)> {
        self.entries.first().map(|(key, priority)| (*key, priority))
    }

    pub fn pop(&mut self) -> Option<(K, P)> {
        let key = self.entries.first()?.0;
        self.remove(key).map(|priority| (key, priority))
    }

    pub fn remove(&mut self, key: K) -> Option<P> {
        let pos = self.positions.remove(&key)?;
        let last = self.entries.len() - 1;
        self.entries.swap(pos, last);
        let (_, priority) = self.entries.pop()?;
        if pos < self.entries.len() {
            self.positions.insert(self.entries[pos].0, pos);
            self.restore(pos);
        }
        Some(priority)
    }

    fn restore(&mut self, pos: usize) {
        let pos = self.sift_up(pos);
        self.sift_down(pos);
    }

    fn sift_up(&mut self, mut pos: usize) -> usize {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.entries[pos].1 >= self.entries[parent].1 {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
        pos
    }

    fn sift_down(&mut self, mut pos: usize) {
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;
            if left < self.entries.len() && self.entries[left].1 < self.entries[smallest].1 {
                smallest = left;
            }
            if right < self.entries.len() && self.entries[right].1 < self.entries[smallest].1 {
                smallest = right;
            }
            if smallest == pos {
                break;
            }
            self.swap(pos, smallest);
            pos = smallest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.entries.swap(a, b);
        self.positions.insert(self.entries[a].0, a);
        self.positions.insert(self.entries[b].0, b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn update_moves_entry() {
        let mut heap = IndexedHeap::new();
        heap.push(1u64, 10);
        heap.push(2, 20);
        heap.push(3, 30);
        heap.push(3, 5);
        assert_eq!(heap.peek(), Some((3, &5)));
        assert_eq!(heap.remove(3), Some(5));
        assert_eq!(heap.pop(), Some((1, 10)));
        assert_eq!(heap.pop(), Some((2, 20)));
        assert!(heap.is_empty());
    }

    proptest! {
        #[test]
        fn pops_in_order(ops in prop::collection::vec((0u64..32, 0i64..1000, any::<bool>()), 0..200)) {
            let mut heap = IndexedHeap::new();
            let mut model = HashMap::new();
            for (key, priority, remove) in ops {
                if remove {
                    prop_assert_eq!(heap.remove(key), model.remove(&key));
                } else {
                    heap.push(key, priority);
                    model.insert(key, priority);
                }
            }
            let mut expected: Vec<_> = model.into_iter().map(|(k, p)| (p, k)).collect();
            expected.sort();
            let mut popped = Vec::new();
            while let Some((key, priority)) = heap.pop() {
                popped.push((priority, key));
            }
            prop_assert_eq!(popped.iter().map(|(p, _)| *p).collect::<Vec<_>>(),
                expected.iter().map(|(p, _)| *p).collect::<Vec<_>>());
        }
    }
}

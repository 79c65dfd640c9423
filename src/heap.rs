//! A max priority queue with addressable entries.
//!
//! Entries are keyed, so the priority of a specific entry can be lowered after
//! it was pushed. Popping an entry drops its key from the position index, and
//! a later decrease for that key finds nothing and says so, instead of
//! touching a slot that by then belongs to another entry.
//!
//! Entries are ordered by `(priority, key)`, so among equal priorities the
//! greater key comes out first.

use std::collections::HashMap;
use std::hash::Hash;

use crate::model::SetHasher;

/// Outcome of [`IndexedHeap::decrease_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decrease {
    Applied(u64),
    Missing,
    Underflow { current: u64 },
}

#[derive(Debug)]
pub struct IndexedHeap<K> {
    slots: Vec<(u64, K)>,
    positions: HashMap<K, usize, SetHasher>,
}

impl<K> Default for IndexedHeap<K>
where
    K: Clone + Eq + Hash + Ord,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> IndexedHeap<K>
where
    K: Clone + Eq + Hash + Ord,
{
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            positions: HashMap::default(),
        }
    }
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            positions: HashMap::with_capacity_and_hasher(capacity, SetHasher::default()),
        }
    }
    pub fn clear(&mut self) {
        self.slots.clear();
        self.positions.clear();
    }

    /// Adds a key. Returns false and leaves the heap alone if the key is present.
    pub fn push(&mut self, key: K, priority: u64) -> bool {
        if self.positions.contains_key(&key) {
            return false;
        }
        let index = self.slots.len();
        self.positions.insert(key.clone(), index);
        self.slots.push((priority, key));
        self.sift_up(index);
        true
    }

    pub fn pop(&mut self) -> Option<(K, u64)> {
        if self.slots.is_empty() {
            return None;
        }
        let last = self.slots.len() - 1;
        self.swap(0, last);
        let (priority, key) = self.slots.pop()?;
        self.positions.remove(&key);
        if !self.slots.is_empty() {
            self.sift_down(0);
        }
        Some((key, priority))
    }

    pub fn decrease_by(&mut self, key: &K, amount: u64) -> Decrease {
        let Some(&index) = self.positions.get(key) else {
            return Decrease::Missing;
        };
        let current = self.slots[index].0;
        if amount > current {
            return Decrease::Underflow { current };
        }
        self.slots[index].0 = current - amount;
        self.sift_down(index);
        Decrease::Applied(current - amount)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.len()
    }
    #[cfg(test)]
    fn priority(&self, key: &K) -> Option<u64> {
        self.positions.get(key).map(|&i| self.slots[i].0)
    }
    #[cfg(test)]
    fn peek(&self) -> Option<(&K, u64)> {
        self.slots.first().map(|(p, k)| (k, *p))
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.slots.swap(a, b);
        if let Some(p) = self.positions.get_mut(&self.slots[a].1) {
            *p = a;
        }
        if let Some(p) = self.positions.get_mut(&self.slots[b].1) {
            *p = b;
        }
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.slots[index] <= self.slots[parent] {
                break;
            }
            self.swap(index, parent);
            index = parent;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.slots.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut largest = index;
            if left < len && self.slots[left] > self.slots[largest] {
                largest = left;
            }
            if right < len && self.slots[right] > self.slots[largest] {
                largest = right;
            }
            if largest == index {
                break;
            }
            self.swap(index, largest);
            index = largest;
        }
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dense identifier pools.
//!
//! Ids are small integers drawn from a fixed-capacity space. Allocation always
//! hands out the lowest id not currently in use, so generated variable names
//! stay short and persisted graphs replay onto the same ids.

use std::collections::BTreeSet;

/// A pool of reusable integer ids in `0..capacity`.
#[derive(Debug, Clone)]
pub(crate) struct IdPool {
    capacity: u16,
    /// One past the highest id ever handed out and still live.
    next: u16,
    /// Released ids below `next`.
    released: BTreeSet<u16>,
}

impl IdPool {
    /// Create an empty pool
    pub(crate) fn new(capacity: u16) -> Self {
        Self {
            capacity,
            next: 0,
            released: BTreeSet::new(),
        }
    }

    /// Take the lowest free id, or `None` when the pool is full.
    pub(crate) fn allocate(&mut self) -> Option<u16> {
        if let Some(id) = self.released.pop_first() {
            return Some(id);
        }
        if self.next < self.capacity {
            self.next += 1;
            return Some(self.next - 1);
        }
        None
    }

    /// Return an id to the pool.
    pub(crate) fn release(&mut self, id: u16) {
        if id >= self.next {
            return;
        }
        if id + 1 == self.next {
            self.next -= 1;
            // Fold trailing released ids back into the high-water mark.
            while let Some(&last) = self.released.last() {
                if last + 1 != self.next {
                    break;
                }
                self.released.pop_last();
                self.next -= 1;
            }
        } else {
            self.released.insert(id);
        }
    }

    /// Number of ids currently in use
    #[cfg(test)]
    pub(crate) fn in_use(&self) -> usize {
        usize::from(self.next) - self.released.len()
    }

    /// Total capacity
    pub(crate) fn capacity(&self) -> usize {
        usize::from(self.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocates_lowest_free() {
        let mut pool = IdPool::new(8);
        let ids: Vec<_> = (0..4).filter_map(|_| pool.allocate()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);

        pool.release(1);
        pool.release(2);
        assert_eq!(pool.allocate(), Some(1));
        assert_eq!(pool.allocate(), Some(2));
        assert_eq!(pool.allocate(), Some(4));
        assert_eq!(pool.in_use(), 5);
    }

    #[test]
    fn test_release_trailing_shrinks_high_water_mark() {
        let mut pool = IdPool::new(8);
        for _ in 0..4 {
            pool.allocate();
        }
        pool.release(2);
        pool.release(3);
        assert_eq!(pool.in_use(), 2);
        assert_eq!(pool.allocate(), Some(2));
        assert_eq!(pool.allocate(), Some(3));
    }

    #[test]
    fn test_exhaustion() {
        let mut pool = IdPool::new(2);
        assert!(pool.allocate().is_some());
        assert!(pool.allocate().is_some());
        assert_eq!(pool.allocate(), None);
        pool.release(0);
        assert_eq!(pool.allocate(), Some(0));
        assert_eq!(pool.capacity(), 2);
    }
}

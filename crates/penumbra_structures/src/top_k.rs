//! BoundedTopK - keep the K best entries of an unbounded stream
//!
//! A fixed-capacity binary max-heap keyed on priority. Lower priority values
//! are better. While the heap has room every entry is accepted; once it is
//! full the root holds the worst entry kept so far, and a newcomer only gets
//! in by being strictly better than that root, which it then replaces.
//!
//! After any sequence of appends the selector holds exactly the K smallest
//! priorities seen. On ties the resident entry survives. Iteration and
//! indexing follow heap order; use [`BoundedTopK::into_sorted_vec`] or
//! [`BoundedTopK::drain_sorted_into`] when priority order matters.

use alloc::vec::Vec;
use core::ops::Index;

/// Fixed-capacity max-heap selecting the lowest priorities
#[derive(Clone, Debug)]
pub struct BoundedTopK<P, D> {
    entries: Vec<(P, D)>,
    capacity: usize,
}

impl<P: Ord, D> BoundedTopK<P, D> {
    /// Create a selector that keeps at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Drop all entries and set a new capacity
    ///
    /// Storage is only reallocated when growing. Entries are dropped in
    /// place, which is a no-op for plain-data element types.
    pub fn reset(&mut self, capacity: usize) {
        self.entries.clear();
        if capacity > self.entries.capacity() {
            self.entries.reserve_exact(capacity);
        }
        self.capacity = capacity;
    }

    /// Offer an entry
    ///
    /// Returns `false` when the selector is full and `priority` is not
    /// strictly better than the worst entry it holds.
    pub fn try_append(&mut self, priority: P, data: D) -> bool {
        if self.capacity == 0 {
            return false;
        }

        if self.entries.len() < self.capacity {
            self.entries.push((priority, data));
            self.sift_up(self.entries.len() - 1);
            return true;
        }

        if priority >= self.entries[0].0 {
            return false;
        }

        self.entries[0] = (priority, data);
        self.sift_down(0);
        true
    }

    /// Offer every entry held by `other`
    pub fn merge(&mut self, other: Self) {
        for (priority, data) in other.entries {
            self.try_append(priority, data);
        }
    }

    /// Worst priority currently kept (the heap root)
    #[inline]
    pub fn worst(&self) -> Option<&P> {
        self.entries.first().map(|(p, _)| p)
    }

    /// Number of entries kept
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries kept
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Data at heap position `index`
    #[inline]
    pub fn get(&self, index: usize) -> Option<&D> {
        self.entries.get(index).map(|(_, d)| d)
    }

    /// Priority at heap position `index`
    #[inline]
    pub fn priority(&self, index: usize) -> Option<&P> {
        self.entries.get(index).map(|(p, _)| p)
    }

    /// Iterate in heap order
    pub fn iter(&self) -> impl Iterator<Item = (&P, &D)> {
        self.entries.iter().map(|(p, d)| (p, d))
    }

    /// Consume into `(priority, data)` pairs sorted best first
    pub fn into_sorted_vec(mut self) -> Vec<(P, D)> {
        self.entries.sort_by(|a, b| a.0.cmp(&b.0));
        self.entries
    }

    /// Append the kept data to `out` best first and empty the selector
    ///
    /// The selector keeps its allocation and capacity.
    pub fn drain_sorted_into(&mut self, out: &mut Vec<D>) {
        self.entries.sort_by(|a, b| a.0.cmp(&b.0));
        out.extend(self.entries.drain(..).map(|(_, d)| d));
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.entries[index].0 > self.entries[parent].0 {
                self.entries.swap(index, parent);
                index = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut largest = index;

            if left < len && self.entries[left].0 > self.entries[largest].0 {
                largest = left;
            }
            if right < len && self.entries[right].0 > self.entries[largest].0 {
                largest = right;
            }
            if largest == index {
                break;
            }

            self.entries.swap(index, largest);
            index = largest;
        }
    }
}

impl<P: Ord, D> Default for BoundedTopK<P, D> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<P: Ord, D> Index<usize> for BoundedTopK<P, D> {
    type Output = D;

    fn index(&self, index: usize) -> &Self::Output {
        &self.entries[index].1
    }
}

// This file is part of Terravis.
//
// Terravis is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Terravis is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Terravis.  If not, see <http://www.gnu.org/licenses/>.
use crate::{stats::MeshStats, tree::TriRef};
use fxhash::FxHashMap;
use ordered_float::OrderedFloat;
use std::{cmp::Reverse, collections::BinaryHeap, fmt};

pub(crate) trait QueueItem {
    fn new(priority: f32, key: TriRef, generation: u32) -> Self;
    fn key(&self) -> TriRef;
    fn generation(&self) -> u32;
    fn priority(&self) -> f32;
}

/// Highest priority first: the split queue.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) struct MaxHeap {
    priority: OrderedFloat<f32>,
    key: TriRef,
    generation: u32,
}

impl QueueItem for MaxHeap {
    fn new(priority: f32, key: TriRef, generation: u32) -> Self {
        Self {
            priority: OrderedFloat(priority),
            key,
            generation,
        }
    }

    fn key(&self) -> TriRef {
        self.key
    }

    fn generation(&self) -> u32 {
        self.generation
    }

    fn priority(&self) -> f32 {
        self.priority.0
    }
}

impl fmt::Debug for MaxHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{:.02}", self.key.tile, self.key.tri, self.priority.0)
    }
}

/// Lowest priority first: the merge queue.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) struct MinHeap {
    priority: Reverse<OrderedFloat<f32>>,
    key: Reverse<TriRef>,
    generation: u32,
}

impl QueueItem for MinHeap {
    fn new(priority: f32, key: TriRef, generation: u32) -> Self {
        Self {
            priority: Reverse(OrderedFloat(priority)),
            key: Reverse(key),
            generation,
        }
    }

    fn key(&self) -> TriRef {
        self.key.0
    }

    fn generation(&self) -> u32 {
        self.generation
    }

    fn priority(&self) -> f32 {
        (self.priority.0).0
    }
}

impl fmt::Debug for MinHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{:.02}",
            self.key.0.tile,
            self.key.0.tri,
            (self.priority.0).0
        )
    }
}

// The core of the queue is a binary heap. Insertions go right into the heap.
// A side map records the live contents with the generation of their newest
// heap entry, so removals and re-prioritisations leave stale entries behind
// that are skipped when they reach the top, rather than rebuilding the heap.
pub(crate) struct Queue<T> {
    heap: BinaryHeap<T>,
    contents: FxHashMap<TriRef, u32>,
    generation: u32,
}

impl<T: QueueItem + Ord + fmt::Debug> Queue<T> {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            contents: FxHashMap::default(),
            generation: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.contents.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    pub(crate) fn contains(&self, key: TriRef) -> bool {
        self.contents.contains_key(&key)
    }

    fn next_generation(&mut self) -> u32 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    pub(crate) fn insert(&mut self, key: TriRef, priority: f32, stats: &mut MeshStats) {
        if self.contents.contains_key(&key) {
            return;
        }
        let generation = self.next_generation();
        self.contents.insert(key, generation);
        self.heap.push(T::new(priority, key, generation));
        stats.insertions += 1;
    }

    pub(crate) fn remove(&mut self, key: TriRef, stats: &mut MeshStats) {
        if self.contents.remove(&key).is_some() {
            stats.removals += 1;
        }
    }

    fn is_live(&self, item: &T) -> bool {
        self.contents.get(&item.key()) == Some(&item.generation())
    }

    fn drop_stale(&mut self) {
        while let Some(top) = self.heap.peek() {
            if self.is_live(top) {
                return;
            }
            self.heap.pop();
        }
    }

    pub(crate) fn peek(&mut self) -> Option<(TriRef, f32)> {
        self.drop_stale();
        self.heap.peek().map(|item| (item.key(), item.priority()))
    }

    /// Live entries at the priority they were queued with, in no order.
    pub(crate) fn entries(&self) -> impl Iterator<Item = (TriRef, f32)> + '_ {
        self.heap
            .iter()
            .filter(|item| self.is_live(item))
            .map(|item| (item.key(), item.priority()))
    }

    #[cfg(test)]
    pub(crate) fn pop(&mut self) -> Option<TriRef> {
        self.drop_stale();
        let item = self.heap.pop()?;
        self.contents.remove(&item.key());
        Some(item.key())
    }

    /// Live entries in queue order.
    #[cfg(test)]
    pub(crate) fn sorted(&self) -> Vec<(TriRef, f32)> {
        let mut live = self
            .heap
            .iter()
            .filter(|item| self.is_live(item))
            .collect::<Vec<&T>>();
        live.sort_unstable_by(|a, b| b.cmp(a));
        live.into_iter().map(|item| (item.key(), item.priority())).collect()
    }

    pub(crate) fn clear(&mut self) {
        self.heap.clear();
        self.contents.clear();
    }

    /// Re-prioritise every live entry and drop all stale ones with an O(n)
    /// rebuild of the heap.
    pub(crate) fn update_cache<F: FnMut(TriRef) -> f32>(
        &mut self,
        mut priority: F,
        stats: &mut MeshStats,
    ) {
        let heap_vec = self
            .contents
            .iter()
            .map(|(&key, &generation)| T::new(priority(key), key, generation))
            .collect::<Vec<_>>();
        stats.moves += heap_vec.len() as u64;
        self.heap = BinaryHeap::from(heap_vec);
    }
}

impl<T: QueueItem + Ord + fmt::Debug> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "heap: {:?}\nctnt: {:?}", self.heap, self.contents)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tri(i: u32) -> TriRef {
        TriRef::new(0, i)
    }

    #[test]
    fn test_max_queue_order() {
        let mut stats = MeshStats::default();
        let mut q = Queue::<MaxHeap>::new();
        q.insert(tri(1), 1f32, &mut stats);
        q.insert(tri(2), 3f32, &mut stats);
        q.insert(tri(3), 2f32, &mut stats);
        q.insert(tri(2), 0f32, &mut stats);
        assert_eq!(q.len(), 3);
        assert_eq!(stats.insertions, 3);
        assert_eq!(q.pop(), Some(tri(2)));
        assert_eq!(q.pop(), Some(tri(3)));
        assert_eq!(q.pop(), Some(tri(1)));
        assert_eq!(q.pop(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn test_min_queue_order() {
        let mut stats = MeshStats::default();
        let mut q = Queue::<MinHeap>::new();
        q.insert(tri(1), 1f32, &mut stats);
        q.insert(tri(2), 3f32, &mut stats);
        q.insert(tri(3), 2f32, &mut stats);
        assert_eq!(q.peek(), Some((tri(1), 1f32)));
        assert_eq!(q.pop(), Some(tri(1)));
        assert_eq!(q.pop(), Some(tri(3)));
    }

    #[test]
    fn test_removed_entries_are_skipped() {
        let mut stats = MeshStats::default();
        let mut q = Queue::<MaxHeap>::new();
        q.insert(tri(1), 1f32, &mut stats);
        q.insert(tri(2), 3f32, &mut stats);
        q.remove(tri(2), &mut stats);
        q.remove(tri(2), &mut stats);
        assert_eq!(stats.removals, 1);
        assert!(!q.contains(tri(2)));
        assert_eq!(q.peek(), Some((tri(1), 1f32)));

        // Re-inserting with a new priority must not resurrect the stale one.
        q.insert(tri(2), 0.5, &mut stats);
        assert_eq!(q.pop(), Some(tri(1)));
        assert_eq!(q.pop(), Some(tri(2)));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_update_cache_reorders() {
        let mut stats = MeshStats::default();
        let mut q = Queue::<MaxHeap>::new();
        for i in 1..10 {
            q.insert(tri(i), i as f32, &mut stats);
        }
        q.remove(tri(4), &mut stats);
        q.update_cache(|key| -(key.tri as f32), &mut stats);
        let sorted = q.sorted();
        assert_eq!(sorted.len(), 8);
        assert_eq!(sorted[0], (tri(1), -1f32));
        for pair in sorted.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
        assert_eq!(q.pop(), Some(tri(1)));
    }
}

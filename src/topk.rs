use rustc_hash::FxHashMap as HashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::Hash;

/// Which end of the count range ranks first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    /// Highest counts first (max-heap).
    #[default]
    Descending,
    /// Lowest counts first (min-heap).
    Ascending,
}

/// One ranked row: a key and how often it was seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hits<K> {
    pub key: K,
    pub hits: u64,
}

/// Key-indexed binary heap of counts.
///
/// `positions` maps every key to its slot in `heap`, so updates and removals
/// by key reheapify from that slot in O(log n). Equal counts are ordered by
/// ascending key, which makes `top_n` a pure function of the stored pairs.
#[derive(Debug, Clone)]
pub struct TopK<K> {
    order: Order,
    heap: Vec<Hits<K>>,
    positions: HashMap<K, usize>,
}

impl<K> TopK<K>
where
    K: Ord + Hash + Clone,
{
    pub fn new(order: Order) -> TopK<K> {
        TopK::with_capacity(order, 0)
    }

    pub fn with_capacity(order: Order, capacity: usize) -> TopK<K> {
        TopK {
            order,
            heap: Vec::with_capacity(capacity),
            positions: HashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    pub fn max() -> TopK<K> {
        TopK::new(Order::Descending)
    }

    pub fn min() -> TopK<K> {
        TopK::new(Order::Ascending)
    }

    /// Sets `key` to `count`, adding it if absent. Returns the previous count.
    pub fn insert(&mut self, key: K, count: u64) -> Option<u64> {
        if let Some(&pos) = self.positions.get(&key) {
            let old = std::mem::replace(&mut self.heap[pos].hits, count);
            self.fix(pos);
            return Some(old);
        }

        let pos = self.heap.len();
        self.positions.insert(key.clone(), pos);
        self.heap.push(Hits { key, hits: count });
        self.sift_up(pos);
        None
    }

    /// Adds `delta` to `key`, starting from zero if absent. Returns the new count.
    pub fn increment(&mut self, key: K, delta: u64) -> u64 {
        match self.positions.get(&key) {
            Some(&pos) => {
                let hits = &mut self.heap[pos].hits;
                *hits = hits.saturating_add(delta);
                let new = *hits;
                self.fix(pos);
                new
            }
            None => {
                self.insert(key, delta);
                delta
            }
        }
    }

    /// Overwrites the count of an existing key. Returns false if `key` is absent.
    pub fn set(&mut self, key: &K, count: u64) -> bool {
        let Some(&pos) = self.positions.get(key) else {
            return false;
        };
        if self.heap[pos].hits != count {
            self.heap[pos].hits = count;
            self.fix(pos);
        }
        true
    }

    pub fn remove(&mut self, key: &K) -> Option<u64> {
        let pos = self.positions.remove(key)?;
        let last = self.heap.len() - 1;
        self.heap.swap(pos, last);
        let removed = self.heap.pop()?;

        if pos < self.heap.len() {
            if let Some(moved) = self.positions.get_mut(&self.heap[pos].key) {
                *moved = pos;
            }
            self.fix(pos);
        }
        Some(removed.hits)
    }

    #[inline]
    pub fn contains(&self, key: &K) -> bool {
        self.positions.contains_key(key)
    }

    #[inline]
    pub fn get(&self, key: &K) -> Option<u64> {
        self.positions.get(key).map(|&pos| self.heap[pos].hits)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.positions.clear();
    }

    /// The `n` highest-priority rows, best first. Leaves `self` untouched.
    ///
    /// Pops from a heap of slot indices that starts as a copy of the current
    /// layout, so the cost is O(len + n log len).
    pub fn top_n(&self, n: usize) -> Vec<Hits<K>> {
        let n = n.min(self.heap.len());
        if n == 0 {
            return Vec::new();
        }

        let mut slots: Vec<usize> = (0..self.heap.len()).collect();
        let mut result = Vec::with_capacity(n);

        while result.len() < n {
            let last = slots.len() - 1;
            slots.swap(0, last);
            let Some(best) = slots.pop() else { break };
            result.push(self.heap[best].clone());

            let mut pos = 0;
            loop {
                let left = 2 * pos + 1;
                let right = left + 1;
                let mut top = pos;
                if left < slots.len() && self.precedes(slots[left], slots[top]) {
                    top = left;
                }
                if right < slots.len() && self.precedes(slots[right], slots[top]) {
                    top = right;
                }
                if top == pos {
                    break;
                }
                slots.swap(pos, top);
                pos = top;
            }
        }

        result
    }

    /// Whether slot `a` ranks ahead of slot `b`.
    #[inline]
    fn precedes(&self, a: usize, b: usize) -> bool {
        let (a, b) = (&self.heap[a], &self.heap[b]);
        let by_count = match self.order {
            Order::Descending => b.hits.cmp(&a.hits),
            Order::Ascending => a.hits.cmp(&b.hits),
        };
        by_count.then_with(|| a.key.cmp(&b.key)) == Ordering::Less
    }

    #[inline]
    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        if let Some(p) = self.positions.get_mut(&self.heap[a].key) {
            *p = a;
        }
        if let Some(p) = self.positions.get_mut(&self.heap[b].key) {
            *p = b;
        }
    }

    fn fix(&mut self, pos: usize) {
        if self.sift_up(pos) == pos {
            self.sift_down(pos);
        }
    }

    fn sift_up(&mut self, mut pos: usize) -> usize {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !self.precedes(pos, parent) {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
        pos
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut top = pos;
            if left < len && self.precedes(left, top) {
                top = left;
            }
            if right < len && self.precedes(right, top) {
                top = right;
            }
            if top == pos {
                return;
            }
            self.swap(pos, top);
            pos = top;
        }
    }
}

impl<K> Extend<(K, u64)> for TopK<K>
where
    K: Ord + Hash + Clone,
{
    fn extend<I: IntoIterator<Item = (K, u64)>>(&mut self, iter: I) {
        for (key, delta) in iter {
            self.increment(key, delta);
        }
    }
}

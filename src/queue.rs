//! Min-priority queue.

use std::cmp::Ordering;

use crate::error::OrderingError;
use crate::ordering::SortKey;

struct Entry<K, T> {
    key: K,
    sequence: u64,
    item: T,
}

impl<K: SortKey, T> Entry<K, T> {
    fn try_cmp(&self, other: &Self) -> Result<Ordering, OrderingError> {
        Ok(self.key.try_cmp(&other.key)?.then(self.sequence.cmp(&other.sequence)))
    }
}

/// Binary min-heap ordered by key.
/// Items with equal keys are popped in the order they were pushed.
/// Both `push` and `pop` take *O*(log *n*) key comparisons.
pub struct OrderedQueue<K, T> {
    entries: Vec<Entry<K, T>>,
    sequence: u64,
}

impl<K: SortKey, T> OrderedQueue<K, T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty queue with space for at least `capacity` items.
    pub fn with_capacity(capacity: usize) -> Self {
        OrderedQueue {
            entries: Vec::with_capacity(capacity),
            sequence: 0,
        }
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if the queue holds no items.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds an item sorted by the key.
    pub fn push(&mut self, item: T, key: K) -> Result<(), OrderingError> {
        self.entries.push(Entry {
            key,
            item,
            sequence: self.sequence,
        });
        self.sequence += 1;

        let mut pos = self.entries.len() - 1;
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.entries[pos].try_cmp(&self.entries[parent])? != Ordering::Less {
                break;
            }
            self.entries.swap(pos, parent);
            pos = parent;
        }

        return Ok(());
    }

    /// Pops the item with the minimum key. Returns `None` if the queue is empty.
    pub fn pop(&mut self) -> Result<Option<T>, OrderingError> {
        Ok(self.pop_entry()?.map(|(_, item)| item))
    }

    /// Pops the item with the minimum key along with the key.
    pub fn pop_entry(&mut self) -> Result<Option<(K, T)>, OrderingError> {
        if self.entries.is_empty() {
            return Ok(None);
        }

        let entry = self.entries.swap_remove(0);

        let len = self.entries.len();
        let mut pos = 0;
        loop {
            let mut smallest = pos;
            for child in [2 * pos + 1, 2 * pos + 2] {
                if child < len && self.entries[child].try_cmp(&self.entries[smallest])? == Ordering::Less {
                    smallest = child;
                }
            }
            if smallest == pos {
                break;
            }
            self.entries.swap(pos, smallest);
            pos = smallest;
        }

        return Ok(Some((entry.key, entry.item)));
    }
}

impl<K: SortKey, T> Default for OrderedQueue<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

//! Fixed-capacity ring buffer used for per-queue diagnostic history.

#![allow(missing_docs)]

/// Oldest-overwriting FIFO with a capacity fixed at construction.
///
/// Storage is a single `Vec` arena plus a head index; once full, each push
/// overwrites the slot holding the oldest element.
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    slots: Vec<T>,
    capacity: usize,
    /// Index of the oldest element once the buffer is full.
    head: usize,
}

impl<T> BoundedHistory<T> {
    /// Create an empty history. A zero capacity is bumped to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    /// Append `value`, returning the evicted oldest element when full.
    pub fn push(&mut self, value: T) -> Option<T> {
        if self.slots.len() < self.capacity {
            self.slots.push(value);
            return None;
        }
        let evicted = std::mem::replace(&mut self.slots[self.head], value);
        self.head = (self.head + 1) % self.capacity;
        Some(evicted)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    /// Oldest retained element.
    #[must_use]
    pub fn oldest(&self) -> Option<&T> {
        if self.slots.is_empty() {
            None
        } else {
            self.slots.get(self.head)
        }
    }

    /// Most recently pushed element.
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        if self.slots.is_empty() {
            return None;
        }
        let idx = if self.is_full() {
            (self.head + self.capacity - 1) % self.capacity
        } else {
            self.slots.len() - 1
        };
        self.slots.get(idx)
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let (newer, older) = self.slots.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
    }
}

impl<T: Clone> BoundedHistory<T> {
    /// Copy of the contents, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

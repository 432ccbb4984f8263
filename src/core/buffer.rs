//! Fixed capacity FIFO container shared by the message log and command history

use std::collections::VecDeque;

/// Bounded collection that evicts its oldest entries on overflow
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    data: VecDeque<T>,
    max_size: usize,
}

impl<T> BoundedBuffer<T> {
    /// Create a new bounded buffer. A capacity of zero is treated as one.
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            data: VecDeque::with_capacity(max_size.min(4096)),
            max_size,
        }
    }

    /// Add an item at the tail, returning how many items were evicted
    pub fn push(&mut self, item: T) -> usize {
        self.data.push_back(item);

        let mut evicted = 0;
        while self.data.len() > self.max_size {
            self.data.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Maximum number of retained items
    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Oldest to newest
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, T> {
        self.data.iter()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.data.get(index)
    }

    pub fn back(&self) -> Option<&T> {
        self.data.back()
    }
}

impl<T: Clone> BoundedBuffer<T> {
    /// Owned copy of the contents, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.data.iter().cloned().collect()
    }
}

impl<T> std::ops::Index<usize> for BoundedBuffer<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.data[index]
    }
}

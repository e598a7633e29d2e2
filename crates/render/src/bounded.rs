use std::ops::{Deref, DerefMut};

/// Vector with a capacity fixed at construction.
///
/// Pushing into a full vector drops the value and counts it, so a frame never
/// grows its arrays past the configured limits.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedVec<T> {
    items: Vec<T>,
    capacity: usize,
    dropped: usize,
}

impl<T> BoundedVec<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Append and return the new element's index, or `None` when full.
    pub fn push(&mut self, value: T) -> Option<u32> {
        if self.items.len() >= self.capacity {
            self.dropped += 1;
            return None;
        }
        self.items.push(value);
        Some((self.items.len() - 1) as u32)
    }

    /// Clear contents and the overflow counter.
    pub fn clear(&mut self) {
        self.items.clear();
        self.dropped = 0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.items.len()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Values refused since the last `clear`.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Resize to `min(len, capacity)`, filling new slots with `value`.
    pub fn resize(&mut self, len: usize, value: T)
    where
        T: Clone,
    {
        if len > self.capacity {
            self.dropped += len - self.capacity;
        }
        self.items.resize(len.min(self.capacity), value);
    }
}

impl<T> Deref for BoundedVec<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T> DerefMut for BoundedVec<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.items
    }
}

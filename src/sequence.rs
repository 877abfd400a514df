//! Growable sequences that close into counted arrays.

use crate::array::{Array, Slot};

/// Capacity of a sequence created with `Sequence::new`.
pub const INITIAL_CAPACITY: usize = 4;

/// A growable buffer with explicit doubling capacity. The buffer always ends
/// with the zero sentinel, so `close` only has to drop the spare capacity.
pub struct Sequence<T: Slot> {
    buf: Vec<T>,
    capacity: usize,
}

impl<T: Slot> Sequence<T> {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut buf = Vec::with_capacity(capacity + 1);
        buf.push(T::zero());
        Self { buf, capacity }
    }

    pub fn len(&self) -> usize {
        self.buf.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Logical capacity; doubles whenever an append would exceed it.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_slice(&self) -> &[T] {
        &self.buf[..self.len()]
    }

    fn grow_to(&mut self, capacity: usize) {
        debug_assert!(capacity >= self.capacity);
        self.capacity = capacity;
        self.buf.reserve_exact(capacity + 1 - self.buf.len());
    }

    pub fn append(&mut self, value: T) {
        let len = self.len();
        if len == self.capacity {
            self.grow_to(self.capacity * 2);
        }
        self.buf.insert(len, value);
    }

    /// Append every value, growing capacity at most once, straight to the
    /// next power of two that fits.
    pub fn append_many(&mut self, values: &[T])
    where
        T: Clone,
    {
        let needed = self.len() + values.len();
        if needed > self.capacity {
            self.grow_to(needed.next_power_of_two());
        }
        let sentinel = self.buf.pop();
        debug_assert!(sentinel.as_ref().map_or(false, T::is_zero));
        self.buf.extend_from_slice(values);
        self.buf.push(T::zero());
    }

    pub fn append_array(&mut self, array: &Array<T>)
    where
        T: Clone,
    {
        self.append_many(array.as_slice())
    }

    pub fn pop(&mut self) -> Option<T> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        // Moves the sentinel down into the vacated slot.
        Some(self.buf.swap_remove(len - 1))
    }

    /// Hand the buffer over to a counted array, consuming the sequence.
    ///
    /// Elements move into the array without being cloned or retained. The
    /// buffer is shrunk to `len + 1` slots first, which reallocates it
    /// whenever capacity was reserved ahead of the last append.
    pub fn close(self) -> Array<T> {
        Array::from_slots(self.buf.into_boxed_slice())
    }
}

impl<T: Slot> Default for Sequence<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Slot> Extend<T> for Sequence<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for v in iter {
            self.append(v);
        }
    }
}

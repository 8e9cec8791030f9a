//! Fixed-depth queue for deferred protocol events.

use alloc::collections::VecDeque;

/// FIFO queue with a hard depth limit.
///
/// Pushing onto a full queue evicts the oldest entry: for deferred state
/// notifications the most recent ones matter.
pub struct BoundedQueue<T> {
    inner: VecDeque<T>,
    depth: usize,
}

impl<T> BoundedQueue<T> {
    /// Create an empty queue holding at most `depth` entries.
    pub fn with_depth(depth: usize) -> Self {
        Self {
            inner: VecDeque::with_capacity(depth),
            depth,
        }
    }

    /// Append to the back. Returns the evicted entry when the queue was full.
    pub fn push_back(&mut self, value: T) -> Option<T> {
        if self.depth == 0 {
            return Some(value);
        }
        let evicted = if self.inner.len() >= self.depth {
            self.inner.pop_front()
        } else {
            None
        };
        self.inner.push_back(value);
        evicted
    }

    /// Remove from the front.
    pub fn pop_front(&mut self) -> Option<T> {
        self.inner.pop_front()
    }

    /// Peek at the front.
    pub fn front(&self) -> Option<&T> {
        self.inner.front()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Maximum number of elements.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Keep only the entries matching `keep`, preserving order.
    pub fn retain(&mut self, keep: impl FnMut(&T) -> bool) {
        self.inner.retain(keep);
    }

    /// Iterate front to back.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.inner.iter()
    }
}

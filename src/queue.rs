//! Outbound message queue
//!
//! A FIFO guarded by one exclusive lock. Any number of producers may push;
//! exactly one consumer (a connection's write loop) drains it.
//!
//! The queue is unbounded and never pushes back on producers: a peer that
//! stops reading makes its queue grow without limit.

use std::collections::VecDeque;

use parking_lot::Mutex;

#[derive(Debug)]
pub struct OutboundQueue<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T> OutboundQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Append to the back
    ///
    /// Returns true if the queue was empty before this push, which tells the
    /// caller that the consumer is idle and must be woken.
    pub fn push_back(&self, item: T) -> bool {
        let mut queue = self.inner.lock();
        let was_empty = queue.is_empty();
        queue.push_back(item);
        was_empty
    }

    /// Remove and return the oldest entry, or None if empty
    pub fn pop_front(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Drop every pending entry
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl<T: Clone> OutboundQueue<T> {
    /// Peek at the oldest entry without removing it
    pub fn front(&self) -> Option<T> {
        self.inner.lock().front().cloned()
    }

    /// Copy of every pending entry, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.lock().iter().cloned().collect()
    }
}

impl<T> Default for OutboundQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

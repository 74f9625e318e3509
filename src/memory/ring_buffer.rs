//! Fixed-capacity FIFO of recent frames
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::ConfigError;
use crate::sync::lock;
use serde::Serialize;
use std::sync::Mutex;

/// Snapshot of buffer occupancy and traffic counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RingBufferStats {
    pub capacity: usize,
    pub current_size: usize,
    pub utilization_pct: f64,
    pub write_count: u64,
    pub read_count: u64,
    pub overflow_count: u64,
    pub head_position: usize,
    pub tail_position: usize,
}

struct RingInner<T> {
    slots: Vec<Option<T>>,
    /// Next slot to write.
    head: usize,
    /// Oldest live slot.
    tail: usize,
    size: usize,
    write_count: u64,
    read_count: u64,
    overflow_count: u64,
}

/// Ring buffer that overwrites its oldest entry when full.
///
/// All state sits behind one mutex, so producers and consumers on different
/// threads share it through `Arc<RingBuffer<T>>`.
pub struct RingBuffer<T> {
    capacity: usize,
    inner: Mutex<RingInner<T>>,
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::Zero("ring_buffer_capacity"));
        }

        Ok(RingBuffer {
            capacity,
            inner: Mutex::new(RingInner {
                slots: (0..capacity).map(|_| None).collect(),
                head: 0,
                tail: 0,
                size: 0,
                write_count: 0,
                read_count: 0,
                overflow_count: 0,
            }),
        })
    }

    /// Appends an item. When full, the oldest item is dropped and the overflow
    /// counter is bumped; the write itself always succeeds.
    pub fn write(&self, item: T) {
        let mut inner = lock(&self.inner);
        if inner.size == self.capacity {
            let tail = inner.tail;
            inner.slots[tail] = None;
            inner.tail = (tail + 1) % self.capacity;
            inner.size -= 1;
            inner.overflow_count += 1;
        }

        let head = inner.head;
        inner.slots[head] = Some(item);
        inner.head = (head + 1) % self.capacity;
        inner.size += 1;
        inner.write_count += 1;
    }

    /// Removes and returns the oldest item, or `None` when empty.
    pub fn read(&self) -> Option<T> {
        let mut inner = lock(&self.inner);
        if inner.size == 0 {
            return None;
        }

        let tail = inner.tail;
        let item = inner.slots[tail].take();
        inner.tail = (tail + 1) % self.capacity;
        inner.size -= 1;
        inner.read_count += 1;
        item
    }

    /// Oldest item, left in place.
    pub fn peek(&self) -> Option<T> {
        let inner = lock(&self.inner);
        if inner.size == 0 {
            return None;
        }
        inner.slots[inner.tail].clone()
    }

    /// Most recently written item, left in place.
    pub fn latest(&self) -> Option<T> {
        let inner = lock(&self.inner);
        if inner.size == 0 {
            return None;
        }
        let idx = (inner.head + self.capacity - 1) % self.capacity;
        inner.slots[idx].clone()
    }

    /// Live items from oldest to newest, without consuming them.
    pub fn snapshot(&self) -> Vec<T> {
        let inner = lock(&self.inner);
        (0..inner.size)
            .filter_map(|i| inner.slots[(inner.tail + i) % self.capacity].clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).size
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).size == 0
    }

    pub fn is_full(&self) -> bool {
        lock(&self.inner).size == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every item and rewinds both cursors. Counters are kept.
    pub fn clear(&self) {
        let mut inner = lock(&self.inner);
        inner.slots.iter_mut().for_each(|slot| *slot = None);
        inner.head = 0;
        inner.tail = 0;
        inner.size = 0;
    }

    pub fn reset_counters(&self) {
        let mut inner = lock(&self.inner);
        inner.write_count = 0;
        inner.read_count = 0;
        inner.overflow_count = 0;
    }

    pub fn stats(&self) -> RingBufferStats {
        let inner = lock(&self.inner);
        RingBufferStats {
            capacity: self.capacity,
            current_size: inner.size,
            utilization_pct: inner.size as f64 / self.capacity as f64 * 100.0,
            write_count: inner.write_count,
            read_count: inner.read_count,
            overflow_count: inner.overflow_count,
            head_position: inner.head,
            tail_position: inner.tail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(RingBuffer::<u32>::new(0).is_err());
    }

    #[test]
    fn overflow_keeps_newest_items() {
        let buffer = RingBuffer::new(4).unwrap();
        for i in 1..=11u32 {
            buffer.write(i);
        }

        let stats = buffer.stats();
        assert_eq!(buffer.len(), 4);
        assert_eq!(stats.overflow_count, 7);
        assert_eq!(stats.write_count, 11);
        assert_eq!(buffer.latest(), Some(11));
        assert_eq!(buffer.peek(), Some(8));
        assert_eq!(buffer.snapshot(), vec![8, 9, 10, 11]);
    }

    #[test]
    fn full_round_trip_preserves_order() {
        let buffer = RingBuffer::new(5).unwrap();
        for i in 0..5u32 {
            buffer.write(i);
        }
        assert!(buffer.is_full());

        let drained: Vec<u32> = (0..5).filter_map(|_| buffer.read()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert_eq!(buffer.stats().overflow_count, 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn empty_reads_return_none() {
        let buffer: RingBuffer<u8> = RingBuffer::new(2).unwrap();
        assert_eq!(buffer.read(), None);
        assert_eq!(buffer.peek(), None);
        assert_eq!(buffer.latest(), None);
        assert_eq!(buffer.stats().read_count, 0);
    }

    #[test]
    fn latest_wraps_around_cursor_zero() {
        let buffer = RingBuffer::new(3).unwrap();
        buffer.write('a');
        buffer.write('b');
        buffer.write('c');
        assert_eq!(buffer.stats().head_position, 0);
        assert_eq!(buffer.latest(), Some('c'));
    }

    #[test]
    fn clear_keeps_counters() {
        let buffer = RingBuffer::new(2).unwrap();
        buffer.write(1);
        buffer.write(2);
        buffer.write(3);
        let _ = buffer.read();
        buffer.clear();

        let stats = buffer.stats();
        assert_eq!(stats.current_size, 0);
        assert_eq!((stats.head_position, stats.tail_position), (0, 0));
        assert_eq!(stats.write_count, 3);
        assert_eq!(stats.read_count, 1);
        assert_eq!(stats.overflow_count, 1);

        buffer.reset_counters();
        assert_eq!(buffer.stats().write_count, 0);
    }

    #[test]
    fn concurrent_producers_never_exceed_capacity() {
        let buffer = Arc::new(RingBuffer::new(16).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for i in 0..250u32 {
                        buffer.write(t * 1000 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = buffer.stats();
        assert_eq!(stats.current_size, 16);
        assert_eq!(stats.write_count, 1000);
        assert_eq!(stats.overflow_count, 1000 - 16);
    }
}

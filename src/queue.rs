// src/queue.rs - Fixed-capacity FIFO backed by a slot pool
//!
//! `BoundedPoolQueue` is used for both the low-level motion commands and the
//! pending piece moves. All storage is allocated once in `new`; pushes and pops
//! only move indices around, so the control loop never touches the allocator.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue full (capacity {capacity})")]
    Full { capacity: usize },
}

/// Occupancy statistics, updated on every successful push.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageStats {
    pub max: usize,
    pub avg: f32,
}

#[derive(Debug)]
pub struct BoundedPoolQueue<T> {
    pool: Box<[Option<T>]>,
    order: Box<[usize]>,
    len: usize,
    stats: UsageStats,
}

impl<T> BoundedPoolQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let pool = (0..capacity).map(|_| None).collect::<Vec<_>>().into_boxed_slice();
        Self {
            pool,
            order: vec![0; capacity].into_boxed_slice(),
            len: 0,
            stats: UsageStats::default(),
        }
    }

    /// Appends `item`, or returns `QueueError::Full` leaving the queue untouched.
    pub fn push(&mut self, item: T) -> Result<(), QueueError> {
        let capacity = self.capacity();
        if self.len >= capacity {
            tracing::debug!(capacity, "push rejected, queue full");
            return Err(QueueError::Full { capacity });
        }
        let slot = self.free_slot().ok_or(QueueError::Full { capacity })?;

        self.pool[slot] = Some(item);
        self.order[self.len] = slot;
        self.len += 1;

        if self.len > self.stats.max {
            self.stats.max = self.len;
        }
        self.stats.avg = (self.stats.avg * 3.0 + self.len as f32) / 4.0;
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let slot = self.order[0];
        self.order.copy_within(1..self.len, 0);
        self.len -= 1;
        self.pool[slot].take()
    }

    pub fn peek(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        self.pool[self.order[0]].as_ref()
    }

    /// Queued items, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.order[..self.len]
            .iter()
            .filter_map(|&slot| self.pool[slot].as_ref())
    }

    pub fn count(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.pool.len()
    }

    /// Number of pushes that would currently succeed.
    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    pub fn usage_stats(&self) -> UsageStats {
        self.stats
    }

    /// Drops every queued item. Usage statistics are kept.
    pub fn clear(&mut self) {
        while self.pop().is_some() {}
    }

    fn free_slot(&self) -> Option<usize> {
        self.pool.iter().position(Option::is_none)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_until_full() {
        let mut queue = BoundedPoolQueue::new(3);
        for i in 0..3 {
            assert_eq!(queue.count(), i);
            assert!(queue.push(i).is_ok());
        }
        assert_eq!(queue.push(99), Err(QueueError::Full { capacity: 3 }));
        assert_eq!(queue.count(), 3);
        assert_eq!(queue.peek(), Some(&0));
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = BoundedPoolQueue::new(8);
        for c in ['a', 'b', 'c', 'd'] {
            queue.push(c).unwrap();
        }
        let drained: Vec<char> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(drained, vec!['a', 'b', 'c', 'd']);
    }

    #[test]
    fn test_pop_empty_returns_none() {
        let mut queue: BoundedPoolQueue<u8> = BoundedPoolQueue::new(2);
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.peek(), None);
        queue.push(1).unwrap();
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_slots_are_reused_after_pop() {
        let mut queue = BoundedPoolQueue::new(2);
        for round in 0..10 {
            queue.push(round).unwrap();
            queue.push(round + 100).unwrap();
            assert_eq!(queue.pop(), Some(round));
            assert_eq!(queue.pop(), Some(round + 100));
        }
        assert!(queue.is_empty());
        assert_eq!(queue.free(), 2);
    }

    #[test]
    fn test_interleaved_push_pop_keeps_order() {
        let mut queue = BoundedPoolQueue::new(3);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.pop(), Some(1));
        queue.push(3).unwrap();
        queue.push(4).unwrap();
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), Some(4));
        assert_eq!(queue.iter().count(), 0);
    }

    #[test]
    fn test_usage_stats() {
        let mut queue = BoundedPoolQueue::new(4);
        queue.push(0).unwrap();
        let stats = queue.usage_stats();
        assert_eq!(stats.max, 1);
        assert!((stats.avg - 0.25).abs() < f32::EPSILON);

        queue.push(1).unwrap();
        // (0.25 * 3 + 2) / 4
        assert!((queue.usage_stats().avg - 0.6875).abs() < 1e-6);
        assert_eq!(queue.usage_stats().max, 2);

        queue.clear();
        queue.push(2).unwrap();
        assert_eq!(queue.usage_stats().max, 2);
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let mut queue = BoundedPoolQueue::new(0);
        assert!(queue.push(1).is_err());
        assert!(queue.is_empty());
    }
}

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

struct Inner<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

/// A bounded FIFO that blocks the producer while full and the consumer
/// while empty, rather than returning an error.
///
/// This is the resource-exhaustion policy the transport uses everywhere a
/// queue sits between two threads running at different rates (the network
/// reader feeding the player, in particular): backpressure, never failure.
/// It is the in-process equivalent of the original's `SharedQueue<T>`,
/// translated from a `std::mutex` + two `std::condition_variable`s guarding
/// a `std::deque` into the same shape in `std::sync`.
pub struct BoundedQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "BoundedQueue capacity must be positive");
        Self {
            inner: Arc::new(Inner {
                items: Mutex::new(VecDeque::with_capacity(capacity)),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                capacity,
            }),
        }
    }

    /// Blocks while the queue is full, then pushes `item` and wakes one
    /// waiting consumer.
    pub fn push(&self, item: T) {
        let mut items = self.inner.items.lock().unwrap();
        while items.len() >= self.inner.capacity {
            items = self.inner.not_full.wait(items).unwrap();
        }
        items.push_back(item);
        drop(items);
        self.inner.not_empty.notify_one();
    }

    /// Blocks while the queue is empty, then pops the oldest item and
    /// wakes one waiting producer.
    pub fn pop(&self) -> T {
        let mut items = self.inner.items.lock().unwrap();
        while items.is_empty() {
            items = self.inner.not_empty.wait(items).unwrap();
        }
        let item = items.pop_front().unwrap();
        drop(items);
        self.inner.not_full.notify_one();
        item
    }

    pub fn len(&self) -> usize {
        self.inner.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn preserves_fifo_order() {
        let q = BoundedQueue::new(8);
        for i in 0..5 {
            q.push(i);
        }
        let popped: Vec<_> = (0..5).map(|_| q.pop()).collect();
        assert_eq!(popped, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn push_blocks_while_full_until_a_pop_makes_room() {
        let q = BoundedQueue::new(1);
        q.push(1);

        let q2 = q.clone();
        let producer = thread::spawn(move || {
            q2.push(2);
        });

        // Give the producer a chance to block on the full queue.
        thread::sleep(Duration::from_millis(20));
        assert_eq!(q.pop(), 1);

        producer.join().unwrap();
        assert_eq!(q.pop(), 2);
    }

    #[test]
    fn pop_blocks_while_empty_until_a_push_arrives() {
        let q: BoundedQueue<i32> = BoundedQueue::new(4);
        let q2 = q.clone();

        let consumer = thread::spawn(move || q2.pop());

        thread::sleep(Duration::from_millis(20));
        q.push(42);

        assert_eq!(consumer.join().unwrap(), 42);
    }
}

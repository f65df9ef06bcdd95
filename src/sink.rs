//! Multi-producer queues feeding the updater.
//!
//! Three implementations trade blocking against queue growth:
//!
//! | sink | `add` | `drain(min)` | bound |
//! |---|---|---|---|
//! | [`NonBlockingSink`] | never blocks | ignores `min` | unbounded |
//! | [`LockingSink`] | never blocks | waits for `min` | unbounded |
//! | [`BoundedSink`] | waits while full | waits for `min` | `capacity` |
//!
//! `close` wakes every blocked caller; afterwards nothing blocks any more.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};

pub trait Sink<T>: Send + Sync {
    /// Enqueue without blocking; hands the item back if the sink is full.
    fn offer(&self, item: T) -> Result<(), T>;

    /// Enqueue, waiting for room if the sink is bounded and full.
    fn add(&self, item: T);

    /// Pop the oldest item without blocking.
    fn remove(&self) -> Option<T>;

    /// Take every queued item, oldest first. Blocking sinks first wait until
    /// at least `min` items are queued or the sink is closed.
    fn drain(&self, min: usize) -> Vec<T>;

    /// Wake blocked callers and disable further blocking.
    fn close(&self);

    fn is_closed(&self) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unbounded lock-free queue.
#[derive(Debug)]
pub struct NonBlockingSink<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    closed: AtomicBool,
}

impl<T> NonBlockingSink<T> {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            closed: AtomicBool::new(false),
        }
    }
}

impl<T> Default for NonBlockingSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Sink<T> for NonBlockingSink<T> {
    fn offer(&self, item: T) -> Result<(), T> {
        // The receiver lives as long as the sender, so send cannot fail.
        self.tx.send(item).map_err(|e| e.into_inner())
    }

    fn add(&self, item: T) {
        let _ = self.offer(item);
    }

    fn remove(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    fn drain(&self, _min: usize) -> Vec<T> {
        self.rx.try_iter().collect()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn len(&self) -> usize {
        self.rx.len()
    }
}

#[derive(Debug)]
struct Queue<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> Queue<T> {
    fn new() -> Self {
        Self {
            items: VecDeque::new(),
            closed: false,
        }
    }
}

/// Unbounded mutex-guarded queue whose `drain` can wait for data.
#[derive(Debug)]
pub struct LockingSink<T> {
    queue: Mutex<Queue<T>>,
    not_empty: Condvar,
}

impl<T> LockingSink<T> {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Queue::new()),
            not_empty: Condvar::new(),
        }
    }
}

impl<T> Default for LockingSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Sink<T> for LockingSink<T> {
    fn offer(&self, item: T) -> Result<(), T> {
        self.add(item);
        Ok(())
    }

    fn add(&self, item: T) {
        self.queue.lock().items.push_back(item);
        self.not_empty.notify_all();
    }

    fn remove(&self) -> Option<T> {
        self.queue.lock().items.pop_front()
    }

    fn drain(&self, min: usize) -> Vec<T> {
        let mut q = self.queue.lock();
        while q.items.len() < min && !q.closed {
            self.not_empty.wait(&mut q);
        }
        q.items.drain(..).collect()
    }

    fn close(&self) {
        self.queue.lock().closed = true;
        self.not_empty.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.queue.lock().closed
    }

    fn len(&self) -> usize {
        self.queue.lock().items.len()
    }
}

/// Fixed-capacity blocking queue. Producers park while it is full.
#[derive(Debug)]
pub struct BoundedSink<T> {
    queue: Mutex<Queue<T>>,
    capacity: usize,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BoundedSink<T> {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(Queue::new()),
            capacity: capacity.max(1),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Send> Sink<T> for BoundedSink<T> {
    fn offer(&self, item: T) -> Result<(), T> {
        let mut q = self.queue.lock();
        if q.items.len() >= self.capacity {
            return Err(item);
        }
        q.items.push_back(item);
        drop(q);
        self.not_empty.notify_all();
        Ok(())
    }

    fn add(&self, item: T) {
        let mut q = self.queue.lock();
        while q.items.len() >= self.capacity && !q.closed {
            self.not_full.wait(&mut q);
        }
        q.items.push_back(item);
        drop(q);
        self.not_empty.notify_all();
    }

    fn remove(&self) -> Option<T> {
        let item = self.queue.lock().items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// `min` is clamped to the capacity so a drain can always be satisfied.
    fn drain(&self, min: usize) -> Vec<T> {
        let min = min.min(self.capacity);
        let mut q = self.queue.lock();
        while q.items.len() < min && !q.closed {
            self.not_empty.wait(&mut q);
        }
        let items: Vec<T> = q.items.drain(..).collect();
        drop(q);
        if !items.is_empty() {
            self.not_full.notify_all();
        }
        items
    }

    fn close(&self) {
        self.queue.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.queue.lock().closed
    }

    fn len(&self) -> usize {
        self.queue.lock().items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn bounded_offer_rejects_overflow() {
        let s = BoundedSink::new(2);
        assert_eq!(s.offer(1), Ok(()));
        assert_eq!(s.offer(2), Ok(()));
        assert_eq!(s.offer(3), Err(3));
        assert_eq!(s.drain(0), vec![1, 2]);
        assert!(s.is_empty());
        s.add(4);
        assert_eq!(s.remove(), Some(4));
        assert_eq!(s.remove(), None);
    }

    #[test]
    fn bounded_add_waits_for_room() {
        let s = Arc::new(BoundedSink::new(1));
        s.add(0);
        let producer = {
            let s = Arc::clone(&s);
            thread::spawn(move || s.add(1))
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(s.len(), 1);
        assert_eq!(s.drain(0), vec![0]);
        producer.join().unwrap();
        assert_eq!(s.drain(1), vec![1]);
    }

    #[test]
    fn locking_drain_waits_for_min() {
        let s = Arc::new(LockingSink::new());
        let consumer = {
            let s = Arc::clone(&s);
            thread::spawn(move || s.drain(3))
        };
        for i in 0..3 {
            thread::sleep(Duration::from_millis(10));
            s.add(i);
        }
        assert_eq!(consumer.join().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn close_wakes_blocked_drain() {
        let s = Arc::new(LockingSink::<u8>::new());
        let consumer = {
            let s = Arc::clone(&s);
            thread::spawn(move || s.drain(10))
        };
        thread::sleep(Duration::from_millis(20));
        s.add(7);
        s.close();
        assert_eq!(consumer.join().unwrap(), vec![7]);
        assert!(s.is_closed());
        assert!(s.drain(10).is_empty());
    }

    #[test]
    fn non_blocking_never_waits() {
        let s = NonBlockingSink::new();
        assert!(s.drain(100).is_empty());
        s.add("a");
        assert_eq!(s.offer("b"), Ok(()));
        assert_eq!(s.len(), 2);
        assert_eq!(s.remove(), Some("a"));
        assert_eq!(s.drain(100), vec!["b"]);
    }

    #[test]
    fn bounded_close_releases_producers() {
        let s = Arc::new(BoundedSink::new(1));
        s.add(0);
        let producer = {
            let s = Arc::clone(&s);
            thread::spawn(move || s.add(1))
        };
        thread::sleep(Duration::from_millis(20));
        s.close();
        producer.join().unwrap();
        assert_eq!(s.drain(0), vec![0, 1]);
    }
}

//! Multi-producer multi-consumer FIFO with a priority lane.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Shared condition a set of queues notifies on.
///
/// One waiter may serve several queues: a consumer that drains more than one
/// queue parks on the waiter and re-checks every queue on wakeup. Producers
/// acquire the waiter lock before notifying, so a wakeup can never be lost
/// between the consumer's emptiness check and its park.
#[derive(Default)]
pub struct MultiQueueWaiter {
    park: Mutex<()>,
    cv: Condvar,
}

/// Lock-free emptiness probe used by [`MultiQueueWaiter::wait`].
pub trait QueueState {
    fn has_state(&self) -> bool;
}

impl MultiQueueWaiter {
    pub fn new() -> Arc<MultiQueueWaiter> {
        Arc::new(MultiQueueWaiter::default())
    }

    /// Blocks until any of `queues` reports state.
    pub fn wait(&self, queues: &[&dyn QueueState]) {
        self.wait_until(queues, || false);
    }

    /// Blocks until any of `queues` reports state or `stop` returns true.
    /// Pair with [`Self::wake_all`] when flipping the stop condition.
    pub fn wait_until(&self, queues: &[&dyn QueueState], stop: impl Fn() -> bool) {
        let mut guard = self.park.lock().unwrap_or_else(|e| e.into_inner());
        while !stop() && !queues.iter().any(|queue| queue.has_state()) {
            guard = self.cv.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Wakes every waiter so it can re-check its stop condition.
    pub fn wake_all(&self) {
        self.notify_all();
    }

    fn notify_one(&self) {
        let _guard = self.park.lock().unwrap_or_else(|e| e.into_inner());
        self.cv.notify_one();
    }

    fn notify_all(&self) {
        let _guard = self.park.lock().unwrap_or_else(|e| e.into_inner());
        self.cv.notify_all();
    }
}

struct Lanes<T> {
    normal: VecDeque<T>,
    priority: VecDeque<T>,
}

/// A thread-safe FIFO with two internal lanes. Priority items dequeue before
/// normal ones regardless of arrival order.
pub struct ThreadedQueue<T> {
    lanes: Mutex<Lanes<T>>,
    total_count: AtomicUsize,
    waiter: Arc<MultiQueueWaiter>,
}

impl<T> ThreadedQueue<T> {
    pub fn new() -> ThreadedQueue<T> {
        ThreadedQueue::with_waiter(MultiQueueWaiter::new())
    }

    /// Builds a queue sharing `waiter` with other queues, so one consumer can
    /// block on all of them at once.
    pub fn with_waiter(waiter: Arc<MultiQueueWaiter>) -> ThreadedQueue<T> {
        ThreadedQueue {
            lanes: Mutex::new(Lanes {
                normal: VecDeque::new(),
                priority: VecDeque::new(),
            }),
            total_count: AtomicUsize::new(0),
            waiter,
        }
    }

    /// Number of queued elements. Lock-free.
    pub fn len(&self) -> usize {
        self.total_count.load(Ordering::SeqCst)
    }

    /// Lock-free emptiness check.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn enqueue(&self, value: T, priority: bool) {
        {
            let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
            if priority {
                lanes.priority.push_back(value);
            } else {
                lanes.normal.push_back(value);
            }
            self.total_count.fetch_add(1, Ordering::SeqCst);
        }
        self.waiter.notify_one();
    }

    pub fn enqueue_all(&self, values: Vec<T>, priority: bool) {
        if values.is_empty() {
            return;
        }
        {
            let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
            self.total_count.fetch_add(values.len(), Ordering::SeqCst);
            for value in values {
                if priority {
                    lanes.priority.push_back(value);
                } else {
                    lanes.normal.push_back(value);
                }
            }
        }
        self.waiter.notify_all();
    }

    /// Blocks until an element is available; priority lane first.
    pub fn dequeue(&self) -> T {
        loop {
            if let Some(value) = self.try_dequeue(true) {
                return value;
            }
            self.waiter.wait(&[self as &dyn QueueState]);
        }
    }

    /// Non-blocking pop. With `priority_first` the priority lane is drained
    /// before the normal one; otherwise the normal lane wins.
    pub fn try_dequeue(&self, priority_first: bool) -> Option<T> {
        let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        let value = if priority_first {
            let first = lanes.priority.pop_front();
            first.or_else(|| lanes.normal.pop_front())
        } else {
            let first = lanes.normal.pop_front();
            first.or_else(|| lanes.priority.pop_front())
        };
        if value.is_some() {
            self.total_count.fetch_sub(1, Ordering::SeqCst);
        }
        value
    }

    /// Visits every queued element (priority lane first) under the lock.
    pub fn iterate(&self, mut f: impl FnMut(&T)) {
        let lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        for entry in &lanes.priority {
            f(entry);
        }
        for entry in &lanes.normal {
            f(entry);
        }
    }

    pub fn waiter(&self) -> Arc<MultiQueueWaiter> {
        Arc::clone(&self.waiter)
    }
}

impl<T> Default for ThreadedQueue<T> {
    fn default() -> Self {
        ThreadedQueue::new()
    }
}

impl<T> QueueState for ThreadedQueue<T> {
    fn has_state(&self) -> bool {
        !self.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn priority_dequeues_before_normal() {
        let queue = ThreadedQueue::new();
        queue.enqueue(1, false);
        queue.enqueue(2, true);
        queue.enqueue(3, false);
        assert_eq!(queue.dequeue(), 2);
        assert_eq!(queue.dequeue(), 1);
        assert_eq!(queue.dequeue(), 3);
    }

    #[test]
    fn try_dequeue_normal_first() {
        let queue = ThreadedQueue::new();
        queue.enqueue(1, true);
        queue.enqueue(2, false);
        assert_eq!(queue.try_dequeue(false), Some(2));
        assert_eq!(queue.try_dequeue(false), Some(1));
        assert_eq!(queue.try_dequeue(false), None);
    }

    #[test]
    fn dequeue_blocks_until_enqueue() {
        let queue = Arc::new(ThreadedQueue::new());
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.enqueue(7, false);
            })
        };
        assert_eq!(queue.dequeue(), 7);
        producer.join().unwrap();
    }

    #[test]
    fn shared_waiter_wakes_on_any_queue() {
        let waiter = MultiQueueWaiter::new();
        let a: Arc<ThreadedQueue<i32>> =
            Arc::new(ThreadedQueue::with_waiter(Arc::clone(&waiter)));
        let b: Arc<ThreadedQueue<i32>> =
            Arc::new(ThreadedQueue::with_waiter(Arc::clone(&waiter)));

        let consumer = {
            let (a, b, waiter) = (Arc::clone(&a), Arc::clone(&b), Arc::clone(&waiter));
            thread::spawn(move || {
                loop {
                    if let Some(v) = a.try_dequeue(true) {
                        return ("a", v);
                    }
                    if let Some(v) = b.try_dequeue(true) {
                        return ("b", v);
                    }
                    waiter.wait(&[a.as_ref() as &dyn QueueState, b.as_ref()]);
                }
            })
        };

        thread::sleep(Duration::from_millis(20));
        b.enqueue(9, false);
        assert_eq!(consumer.join().unwrap(), ("b", 9));
    }

    #[test]
    fn enqueue_all_counts() {
        let queue = ThreadedQueue::new();
        queue.enqueue_all(vec![1, 2, 3], false);
        assert_eq!(queue.len(), 3);
        queue.enqueue_all(Vec::new(), true);
        assert_eq!(queue.len(), 3);
    }
}

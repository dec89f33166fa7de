//! Single-producer/single-consumer FIFO with an end-of-stream signal.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

struct Inner<T> {
    items: VecDeque<T>,
    ready: bool,
    eof: bool,
}

/// An ordered queue with a peek-then-pop discipline.
///
/// The consumer observes the head with [`next`](AsyncQueue::next) and only
/// removes it with [`done`](AsyncQueue::done) once the work it describes has
/// completed, so [`len`](AsyncQueue::len) honestly counts the in-flight item.
pub struct AsyncQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
}

impl<T> AsyncQueue<T> {
    pub fn new() -> Self {
        AsyncQueue {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                ready: false,
                eof: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Append an item and wake the consumer.
    pub fn put(&self, item: T) {
        let mut inner = self.inner.lock().unwrap();
        inner.items.push_back(item);
        inner.ready = true;
        drop(inner);
        self.notify.notify_one();
    }

    /// Mark the end of the stream, waking a consumer so it can observe
    /// the (possibly empty) remainder.
    pub fn eof(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.eof = true;
        inner.ready = true;
        drop(inner);
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().items.is_empty()
    }
}

impl<T: Clone + PartialEq> AsyncQueue<T> {
    /// Wait until the queue is ready, then peek the head without removing
    /// it. Returns `None` once the stream has ended and the queue is empty.
    pub async fn next(&self) -> Option<T> {
        loop {
            {
                let inner = self.inner.lock().unwrap();
                if inner.ready {
                    return inner.items.front().cloned();
                }
            }
            self.notify.notified().await;
        }
    }

    /// Pop the head previously returned by [`next`](AsyncQueue::next).
    pub fn done(&self, item: &T) {
        let mut inner = self.inner.lock().unwrap();
        let head = inner.items.pop_front().expect("done() without a pending item");
        debug_assert!(head == *item, "done() must receive the current head");
        if inner.items.is_empty() && !inner.eof {
            inner.ready = false;
        }
    }
}

impl<T> Default for AsyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

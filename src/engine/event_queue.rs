use crate::events::RawEvent;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// Bounded queue between instrumentation producers and the engine task.
///
/// Producers never block and are never pushed back on: when the queue is
/// full, the *oldest* queued event is dropped and counted, so a stalled
/// consumer degrades the capture history rather than the instrumented
/// application.
pub struct EventQueue {
    inner: Mutex<VecDeque<RawEvent>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl EventQueue {
    pub fn new(capacity: usize) -> EventQueue {
        EventQueue {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(1_024))),
            notify: Notify::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueues an event, dropping the oldest one when at capacity.
    pub fn push(&self, event: RawEvent) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        {
            let mut queue = self.inner.lock().unwrap();
            if queue.len() == self.capacity {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(event);
        }
        self.notify.notify_one();
    }

    /// Dequeues the next event, waiting for one if the queue is empty.
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<RawEvent> {
        loop {
            if let Some(event) = self.inner.lock().unwrap().pop_front() {
                return Some(event);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// Discards everything currently queued. Used by reset so queued
    /// pre-reset events cannot resurrect pre-reset state.
    pub fn clear(&self) -> usize {
        let mut queue = self.inner.lock().unwrap();
        let cleared = queue.len();
        queue.clear();
        cleared
    }

    /// Takes and resets the overflow-drop counter.
    pub fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

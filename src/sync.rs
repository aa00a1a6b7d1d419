// src/sync.rs
use std::sync::{Condvar, Mutex};

/// Counting semaphore assembled from a mutex and a condition variable.
///
/// `wait` blocks until the count is positive, then decrements it; `post`
/// increments the count and wakes one waiter. The worker pool uses the count
/// as "tasks queued", so idle workers block here instead of spinning.
pub struct Semaphore {
    count: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            available: Condvar::new(),
        }
    }

    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        while *count == 0 {
            count = self
                .available
                .wait(count)
                .unwrap_or_else(|e| e.into_inner());
        }
        *count -= 1;
    }

    pub fn post(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        *count += 1;
        self.available.notify_one();
    }
}

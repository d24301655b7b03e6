use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::common::handoff_error::handoff_error::HandoffError;

/// Counting semaphore: a pool of permits handed out one per acquire.
/// Built on the same mutex + condvar construction as the channel.
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// Non-blocking acquire: true if a permit was taken.
    pub fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock().unwrap();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    /// Blocking acquire: waits until a permit is available.
    pub fn acquire(&self) {
        let mut permits = self.permits.lock().unwrap();
        while *permits == 0 {
            permits = self.available.wait(permits).unwrap();
        }
        *permits -= 1;
    }

    /// Like acquire, but gives up after `timeout` with no permit taken.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<(), HandoffError> {
        // an unrepresentable deadline means the wait is effectively unbounded
        let deadline = Instant::now().checked_add(timeout);
        let mut permits = self.permits.lock().unwrap();
        while *permits == 0 {
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(HandoffError::Timeout);
                    }
                    permits = self
                        .available
                        .wait_timeout(permits, deadline.saturating_duration_since(now))
                        .unwrap()
                        .0;
                }
                None => {
                    permits = self.available.wait(permits).unwrap();
                }
            }
        }
        *permits -= 1;
        Ok(())
    }

    /// Returns a permit to the pool and wakes one waiter.
    pub fn release(&self) {
        let mut permits = self.permits.lock().unwrap();
        *permits += 1;
        drop(permits);
        self.available.notify_one();
    }

    /// Blocking acquire returning a guard that releases the permit on
    /// drop, on every exit path.
    pub fn access(&self) -> SemaphoreGuard<'_> {
        self.acquire();
        SemaphoreGuard { sem: self }
    }

    pub fn available_permits(&self) -> usize {
        *self.permits.lock().unwrap()
    }
}

pub struct SemaphoreGuard<'a> {
    sem: &'a Semaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        self.sem.release();
    }
}

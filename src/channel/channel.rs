use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::cancel::cancel::CancelToken;
use crate::channel::slot::Slot;
use crate::common::handoff_error::handoff_error::{HandoffError, PutError};

/// One-slot blocking handoff between producers and consumers.
///
/// A put blocks while the slot is occupied, a take blocks while it is
/// empty. Any number of producers and consumers may share one channel;
/// every value is delivered to exactly one consumer.
pub struct HandoffChannel<T> {
    slot: Mutex<Slot<T>>,

    // signaled when the slot empties / fills
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> HandoffChannel<T> {
    // cancel flag re-check interval for cancellable waits
    const CANCEL_TICK: Duration = Duration::from_millis(5);

    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::empty()),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Non-blocking put: Ok(()) on success, Err(value) if the slot is occupied.
    pub fn try_put(&self, value: T) -> Result<(), T> {
        let mut guard = self.slot.lock().unwrap();
        if guard.is_occupied() {
            return Err(value);
        }
        guard.value = Some(value);
        drop(guard);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Non-blocking take: Some(value) on success, None if the slot is empty.
    pub fn try_take(&self) -> Option<T> {
        let mut guard = self.slot.lock().unwrap();
        let value = guard.value.take()?;
        drop(guard);
        self.not_full.notify_one();
        Some(value)
    }

    /// Blocking put: waits until the slot empties, then stores the value
    /// and wakes one consumer.
    pub fn put(&self, value: T) {
        let mut guard = self.slot.lock().unwrap();
        while guard.is_occupied() {
            guard = self.not_full.wait(guard).unwrap();
        }
        guard.value = Some(value);
        drop(guard);
        self.not_empty.notify_one();
    }

    /// Blocking take: waits until the slot fills, then clears it and
    /// wakes one producer.
    pub fn take(&self) -> T {
        let mut guard = self.slot.lock().unwrap();
        while !guard.is_occupied() {
            guard = self.not_empty.wait(guard).unwrap();
        }
        let value = guard.value.take().unwrap();
        drop(guard);
        self.not_full.notify_one();
        value
    }

    /// Like put, but gives up after `timeout`. On expiry the value is
    /// handed back untouched and the slot keeps whatever it held.
    pub fn put_timeout(&self, value: T, timeout: Duration) -> Result<(), PutError<T>> {
        // an unrepresentable deadline means the wait is effectively unbounded
        self.put_bounded(value, Instant::now().checked_add(timeout), None)
    }

    /// Like take, but gives up after `timeout` with no state change.
    pub fn take_timeout(&self, timeout: Duration) -> Result<T, HandoffError> {
        self.take_bounded(Instant::now().checked_add(timeout), None)
    }

    /// Like put, but fails once `cancel` fires. No state change on failure.
    pub fn put_cancellable(&self, value: T, cancel: &CancelToken) -> Result<(), PutError<T>> {
        self.put_bounded(value, None, Some(cancel))
    }

    /// Like take, but fails once `cancel` fires. No state change on failure.
    pub fn take_cancellable(&self, cancel: &CancelToken) -> Result<T, HandoffError> {
        self.take_bounded(None, Some(cancel))
    }

    /// Advisory snapshot; may be stale by the time the caller acts on it.
    pub fn is_occupied(&self) -> bool {
        self.slot.lock().unwrap().is_occupied()
    }

    fn put_bounded(
        &self,
        value: T,
        deadline: Option<Instant>,
        cancel: Option<&CancelToken>,
    ) -> Result<(), PutError<T>> {
        let guard = self.slot.lock().unwrap();
        let mut guard = match self.wait_while_occupied_is(&self.not_full, guard, true, deadline, cancel)
        {
            Ok(guard) => guard,
            Err(HandoffError::Timeout) => return Err(PutError::Timeout(value)),
            Err(HandoffError::Cancelled) => return Err(PutError::Cancelled(value)),
        };
        guard.value = Some(value);
        drop(guard);
        self.not_empty.notify_one();
        Ok(())
    }

    fn take_bounded(
        &self,
        deadline: Option<Instant>,
        cancel: Option<&CancelToken>,
    ) -> Result<T, HandoffError> {
        let guard = self.slot.lock().unwrap();
        let mut guard =
            self.wait_while_occupied_is(&self.not_empty, guard, false, deadline, cancel)?;
        let value = guard.value.take().unwrap();
        drop(guard);
        self.not_full.notify_one();
        Ok(value)
    }

    /// Waits on `cv` while `slot.is_occupied() == blocked_when`, re-checking
    /// the predicate after every wakeup. Timeout and cancellation fail
    /// without touching the slot; the waiter simply leaves the wait set.
    fn wait_while_occupied_is<'a>(
        &self,
        cv: &Condvar,
        mut guard: MutexGuard<'a, Slot<T>>,
        blocked_when: bool,
        deadline: Option<Instant>,
        cancel: Option<&CancelToken>,
    ) -> Result<MutexGuard<'a, Slot<T>>, HandoffError> {
        loop {
            if guard.is_occupied() != blocked_when {
                return Ok(guard);
            }

            if let Some(token) = cancel {
                if token.is_cancelled() {
                    return Err(HandoffError::Cancelled);
                }
            }

            let now = Instant::now();
            if let Some(deadline) = deadline {
                if now >= deadline {
                    return Err(HandoffError::Timeout);
                }
            }

            guard = match (deadline, cancel) {
                (None, None) => cv.wait(guard).unwrap(),
                _ => {
                    // the token has no handle on our condvars, so a
                    // cancellable wait re-checks the flag every tick
                    let wait_for = match deadline {
                        Some(deadline) => {
                            let remaining = deadline.saturating_duration_since(now);
                            if cancel.is_some() {
                                remaining.min(Self::CANCEL_TICK)
                            } else {
                                remaining
                            }
                        }
                        None => Self::CANCEL_TICK,
                    };
                    cv.wait_timeout(guard, wait_for).unwrap().0
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_put_then_take_immediate() {
        let ch = HandoffChannel::new();
        ch.put("x");
        assert!(ch.is_occupied());
        assert_eq!(ch.take(), "x");
        assert!(!ch.is_occupied());
    }

    #[test]
    fn test_nonblocking_put_take() {
        let ch = HandoffChannel::new();
        assert!(ch.try_put(1).is_ok());
        assert_eq!(ch.try_put(2), Err(2));
        assert_eq!(ch.try_take(), Some(1));
        assert_eq!(ch.try_take(), None);
    }

    #[test]
    fn test_take_blocks_until_put() {
        let ch = Arc::new(HandoffChannel::new());
        let taker = ch.clone();

        let handle = thread::spawn(move || taker.take());

        // give the taker time to park
        thread::sleep(Duration::from_millis(50));
        ch.put("y");
        assert_eq!(handle.join().unwrap(), "y");
    }

    #[test]
    fn test_put_blocks_until_take() {
        let ch = Arc::new(HandoffChannel::new());
        ch.put(1);

        let putter = ch.clone();
        let handle = thread::spawn(move || {
            putter.put(2);
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        assert_eq!(ch.take(), 1);
        handle.join().unwrap();
        assert_eq!(ch.take(), 2);
    }

    #[test]
    fn test_put_timeout_keeps_old_value() {
        let ch = HandoffChannel::new();
        ch.put("z");

        let started = Instant::now();
        let res = ch.put_timeout("w", Duration::from_millis(50));
        assert!(started.elapsed() >= Duration::from_millis(50));

        match res {
            Ok(()) => panic!("put into a full slot must not succeed"),
            Err(err) => {
                assert_eq!(err.reason(), HandoffError::Timeout);
                assert_eq!(err.into_value(), "w");
            }
        }

        assert_eq!(ch.take(), "z");
    }

    #[test]
    fn test_take_timeout_on_empty() {
        let ch: HandoffChannel<u32> = HandoffChannel::new();
        assert_eq!(
            ch.take_timeout(Duration::from_millis(20)),
            Err(HandoffError::Timeout)
        );
        assert!(!ch.is_occupied());
    }

    #[test]
    fn test_cancel_blocked_take() {
        let ch: Arc<HandoffChannel<u32>> = Arc::new(HandoffChannel::new());
        let token = CancelToken::new();

        let taker = ch.clone();
        let taker_token = token.clone();
        let handle = thread::spawn(move || taker.take_cancellable(&taker_token));

        thread::sleep(Duration::from_millis(30));
        token.cancel();
        assert_eq!(handle.join().unwrap(), Err(HandoffError::Cancelled));

        // channel stays usable after a cancelled wait
        ch.put(7);
        assert_eq!(ch.take(), 7);
    }

    #[test]
    fn test_cancel_blocked_put() {
        let ch = Arc::new(HandoffChannel::new());
        ch.put(1);
        let token = CancelToken::new();

        let putter = ch.clone();
        let putter_token = token.clone();
        let handle = thread::spawn(move || putter.put_cancellable(2, &putter_token));

        thread::sleep(Duration::from_millis(30));
        token.cancel();

        match handle.join().unwrap() {
            Ok(()) => panic!("cancelled put must not succeed"),
            Err(err) => {
                assert_eq!(err.reason(), HandoffError::Cancelled);
                assert_eq!(err.into_value(), 2);
            }
        }

        assert_eq!(ch.take(), 1);
        assert!(!ch.is_occupied());
    }

    #[test]
    fn test_fired_token_does_not_block_ready_handoff() {
        let ch = HandoffChannel::new();
        let token = CancelToken::new();
        token.cancel();

        // cancellation only interrupts waiting: with the slot ready the
        // operation completes, so a coordinator shutting consumers down
        // must drain the slot itself
        assert!(ch.put_cancellable(5, &token).is_ok());
        assert_eq!(ch.take_cancellable(&token), Ok(5));
        assert!(!ch.is_occupied());
    }

    #[test]
    fn test_huge_timeout_does_not_panic() {
        let ch = HandoffChannel::new();
        assert!(ch.put_timeout("a", Duration::MAX).is_ok());
        assert_eq!(ch.take_timeout(Duration::MAX), Ok("a"));
    }

    #[test]
    fn test_mpmc_no_loss_no_dup() {
        const PRODUCERS: u64 = 4;
        const CONSUMERS: u64 = 4;
        const PER_PRODUCER: u64 = 200;

        let ch = Arc::new(HandoffChannel::new());
        let results = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();

        for pid in 0..PRODUCERS {
            let producer = ch.clone();
            handles.push(thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    producer.put(pid * PER_PRODUCER + seq);
                }
            }));
        }

        // total consumption matches total production so nobody blocks forever
        let per_consumer = PRODUCERS * PER_PRODUCER / CONSUMERS;
        for _ in 0..CONSUMERS {
            let consumer = ch.clone();
            let results = results.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..per_consumer {
                    let v = consumer.take();
                    results.lock().unwrap().push(v);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let mut got = results.lock().unwrap().clone();
        got.sort();
        let expected: Vec<u64> = (0..PRODUCERS * PER_PRODUCER).collect();
        assert_eq!(got, expected);
        assert!(!ch.is_occupied());
    }
}

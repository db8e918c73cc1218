//! Synchronization primitives for the device worker handshake.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Lock a mutex, ignoring poisoning.
///
/// A panicking audio callback must not wedge every later device operation,
/// so the poison flag is stripped and the guarded data used as-is.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An auto-reset event: `wait` blocks until `signal`, consuming the signal.
///
/// A signal delivered with no waiter stays latched until the next `wait`
/// (or an explicit `reset`), matching manual-event semantics the worker
/// handshake relies on.
pub(crate) struct Event {
    signaled: Mutex<bool>,
    cv: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Event {
            signaled: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Wake one waiter, or latch the signal if nobody is waiting.
    pub fn signal(&self) {
        let mut signaled = lock(&self.signaled);
        *signaled = true;
        drop(signaled);
        self.cv.notify_one();
    }

    /// Block until signaled; consumes the signal.
    pub fn wait(&self) {
        let mut signaled = lock(&self.signaled);
        while !*signaled {
            signaled = self
                .cv
                .wait(signaled)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *signaled = false;
    }

    /// Drop any latched signal.
    pub fn reset(&self) {
        *lock(&self.signaled) = false;
    }
}

/// The worker-side break flag plus a condvar for bounded waits.
///
/// Backends that pace themselves (null, the ring bridge) sleep on
/// [`WorkerControl::wait_timeout`], so a break request wakes them
/// immediately; backends that block in a native wait poll
/// [`WorkerControl::should_break`] at least once per period.
pub(crate) struct WorkerControl {
    break_requested: Mutex<bool>,
    cv: Condvar,
}

impl WorkerControl {
    pub fn new() -> Self {
        WorkerControl {
            break_requested: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Ask the I/O loop to return at its next wakeup.
    pub fn request_break(&self) {
        let mut flag = lock(&self.break_requested);
        *flag = true;
        drop(flag);
        self.cv.notify_all();
    }

    /// Clear the flag before a run enters its loop.
    pub fn clear_break(&self) {
        *lock(&self.break_requested) = false;
    }

    pub fn should_break(&self) -> bool {
        *lock(&self.break_requested)
    }

    /// Sleep for at most `timeout`, returning early (true) on break.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut flag = lock(&self.break_requested);
        if !*flag {
            let (guard, _) = self
                .cv
                .wait_timeout(flag, timeout)
                .unwrap_or_else(PoisonError::into_inner);
            flag = guard;
        }
        *flag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn event_latches_without_waiter() {
        let event = Event::new();
        event.signal();
        // Consumed instantly, no blocking.
        event.wait();
    }

    #[test]
    fn event_auto_resets() {
        let event = Arc::new(Event::new());
        let remote = Arc::clone(&event);
        let handle = thread::spawn(move || {
            remote.wait();
            remote.wait()
        });
        event.signal();
        event.signal();
        handle.join().unwrap();
    }

    #[test]
    fn reset_drops_latched_signal() {
        let event = Event::new();
        event.signal();
        event.reset();
        assert!(!*lock(&event.signaled));
    }

    #[test]
    fn break_wakes_sleeper_early() {
        let control = Arc::new(WorkerControl::new());
        let remote = Arc::clone(&control);
        let start = Instant::now();
        let handle = thread::spawn(move || remote.wait_timeout(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        control.request_break();
        assert!(handle.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn timeout_without_break_returns_false() {
        let control = WorkerControl::new();
        assert!(!control.wait_timeout(Duration::from_millis(5)));
    }
}

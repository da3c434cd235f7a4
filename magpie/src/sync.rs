//! Manual-reset wake event for worker threads.
//!
//! One `set` wakes the worker and the flag then stays up until the worker
//! observes an empty queue and calls `reset` — so a burst of submissions
//! while the worker is mid-task needs no re-signaling, and a signal that
//! races a timed wait is never lost.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

pub(crate) struct WakeEvent {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl WakeEvent {
    pub(crate) fn new() -> WakeEvent {
        WakeEvent {
            flag: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Raises the flag and wakes a waiter.
    pub(crate) fn set(&self) {
        let mut flag = self.flag.lock().expect("wake event lock poisoned");
        *flag = true;
        self.cond.notify_one();
    }

    /// Lowers the flag. Waiters that have not yet observed it will block.
    pub(crate) fn reset(&self) {
        let mut flag = self.flag.lock().expect("wake event lock poisoned");
        *flag = false;
    }

    /// Blocks until the flag is up. The flag is left up (manual reset).
    pub(crate) fn wait(&self) {
        let mut flag = self.flag.lock().expect("wake event lock poisoned");
        while !*flag {
            flag = self.cond.wait(flag).expect("wake event lock poisoned");
        }
    }

    /// Blocks until the flag is up or `timeout` elapses. Returns `true` when
    /// signaled, `false` on timeout.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut flag = self.flag.lock().expect("wake event lock poisoned");
        while !*flag {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, result) = self
                .cond
                .wait_timeout(flag, deadline - now)
                .expect("wake event lock poisoned");
            flag = guard;
            if result.timed_out() && !*flag {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn set_before_wait_is_not_lost() {
        let event = WakeEvent::new();
        event.set();
        assert!(event.wait_timeout(Duration::from_millis(10)));
        // Manual reset: still signaled until reset.
        assert!(event.wait_timeout(Duration::from_millis(10)));
        event.reset();
        assert!(!event.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn wait_wakes_on_set_from_another_thread() {
        let event = Arc::new(WakeEvent::new());
        let setter = event.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            setter.set();
        });
        event.wait();
        handle.join().unwrap();
    }

    #[test]
    fn timed_wait_reports_timeout() {
        let event = WakeEvent::new();
        let start = Instant::now();
        assert!(!event.wait_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}

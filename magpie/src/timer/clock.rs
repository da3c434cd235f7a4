//! Monotonic millisecond clock for event deadlines.
//!
//! Deadlines are plain `i64` milliseconds on a process-local monotonic
//! scale, leaving the extremes of the range free as ordering sentinels
//! ("front of queue" and "back of queue" posts).

use std::time::Instant;

use lazy_static::lazy_static;

lazy_static! {
    static ref CLOCK_EPOCH: Instant = Instant::now();
}

/// Milliseconds elapsed since the first use of the clock in this process.
pub(crate) fn now_millis() -> i64 {
    CLOCK_EPOCH.elapsed().as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn clock_is_monotonic() {
        let a = now_millis();
        thread::sleep(Duration::from_millis(15));
        let b = now_millis();
        assert!(b >= a + 10);
    }
}

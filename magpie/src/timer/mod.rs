//! # Timed-Event Scheduler
//!
//! A [`TimedEventQueue`] runs one dedicated OS thread over a time-ordered
//! pending list. Callers post [`TimedEventState`] entries for "now", for the
//! back of the queue, or for a millisecond delay; the thread sleeps until
//! the earliest deadline and invokes callbacks directly on itself — this is
//! a mechanism parallel to and independent of the thread pool.
//!
//! Posting an earlier deadline always preempts a thread that is sleeping
//! toward a later one, and entries can be cancelled by id any time before
//! they are dequeued. A callback that is already executing cannot be
//! cancelled or interrupted.

pub mod queue;
pub mod state;

pub(crate) mod clock;

pub use queue::{ShutdownFlush, ShutdownMode, TimedEventQueue, TimerHandle};
pub use state::{TimedEventId, TimedEventState, INVALID_EVENT_ID};

/// A unit of work executable by the timed-event thread.
///
/// The callback runs synchronously on the queue's own thread without the
/// queue's lock held, so it may post or cancel events through `queue`
/// while it runs.
pub trait TimedEventCallback: Send + Sync {
    fn invoke(&self, state: &TimedEventState, queue: &TimerHandle);
}

impl<F> TimedEventCallback for F
where
    F: Fn(&TimedEventState, &TimerHandle) + Send + Sync,
{
    fn invoke(&self, state: &TimedEventState, queue: &TimerHandle) {
        self(state, queue)
    }
}

//! Scheduled, cancellable, time-stamped callback entries.

use std::sync::{Arc, Mutex};

use magpie_api::{AsyncError, ObjectRef};

use crate::timer::TimedEventCallback;

/// Identifier assigned to an event when it is posted to a queue.
pub type TimedEventId = u32;

/// Marks an entry that has been removed or cancelled; never assigned to a
/// live event.
pub const INVALID_EVENT_ID: TimedEventId = 0;

/// Initial value of a queue's id counter.
pub(crate) const STARTUP_EVENT_ID: TimedEventId = 1;

/// What consuming an entry means to the queue thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventKind {
    /// Invoke the entry's callback.
    Invoke,
    /// Stop the queue thread; posted only by queue shutdown.
    Abort,
}

struct StateInner {
    id: TimedEventId,
    time: i64,
    object: Option<ObjectRef>,
}

/// One scheduled callback: its queue id, target time, optional payload and
/// the callback to run when due.
///
/// The id and target time are assigned by the queue on posting; the same
/// state instance may be posted again after it has fired or been cancelled.
pub struct TimedEventState {
    kind: EventKind,
    callback: Option<Arc<dyn TimedEventCallback>>,
    inner: Mutex<StateInner>,
}

impl TimedEventState {
    /// Creates an invokable entry carrying `callback` and an optional
    /// payload object.
    pub fn new(
        callback: Option<Arc<dyn TimedEventCallback>>,
        object: Option<ObjectRef>,
    ) -> Arc<TimedEventState> {
        Arc::new(TimedEventState {
            kind: EventKind::Invoke,
            callback,
            inner: Mutex::new(StateInner {
                id: INVALID_EVENT_ID,
                time: 0,
                object,
            }),
        })
    }

    /// Creates the sentinel entry that stops a queue thread.
    pub(crate) fn new_abort() -> Arc<TimedEventState> {
        Arc::new(TimedEventState {
            kind: EventKind::Abort,
            callback: None,
            inner: Mutex::new(StateInner {
                id: INVALID_EVENT_ID,
                time: 0,
                object: None,
            }),
        })
    }

    /// The id assigned by the queue, or [`INVALID_EVENT_ID`] when the entry
    /// is not currently posted.
    pub fn event_id(&self) -> TimedEventId {
        self.lock_inner().id
    }

    pub(crate) fn set_event_id(&self, id: TimedEventId) {
        self.lock_inner().id = id;
    }

    /// Target time on the queue's monotonic millisecond scale.
    pub fn time(&self) -> i64 {
        self.lock_inner().time
    }

    pub(crate) fn set_time(&self, time: i64) {
        self.lock_inner().time = time;
    }

    /// Replaces the payload object; `None` clears it.
    pub fn set_object(&self, object: Option<ObjectRef>) {
        self.lock_inner().object = object;
    }

    /// Returns a retained reference to the payload object, or
    /// [`AsyncError::NotFound`] when none is set.
    pub fn object(&self) -> Result<ObjectRef, AsyncError> {
        self.lock_inner().object.clone().ok_or(AsyncError::NotFound)
    }

    pub(crate) fn callback(&self) -> Option<Arc<dyn TimedEventCallback>> {
        self.callback.clone()
    }

    pub(crate) fn kind(&self) -> EventKind {
        self.kind
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, StateInner> {
        self.inner.lock().expect("event state lock poisoned")
    }
}

impl std::fmt::Debug for TimedEventState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock_inner();
        f.debug_struct("TimedEventState")
            .field("kind", &self.kind)
            .field("id", &inner.id)
            .field("time", &inner.time)
            .field("has_object", &inner.object.is_some())
            .finish()
    }
}

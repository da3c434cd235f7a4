//! # Deadline-Ordered Event Queue
//!
//! One dedicated thread serves a pending list kept sorted ascending by
//! target time (FIFO among equal times). Two condition variables drive it:
//! `not_empty` wakes the thread when the list gains its first entry, and
//! `head_changed` interrupts an in-progress timed wait whenever the earliest
//! deadline moves — a newly posted earlier entry, or a cancelled head.
//!
//! Waits are bounded to ten-second slices, so even a mis-delivered
//! `head_changed` signal can delay re-evaluation by at most one slice while
//! keeping far-future deadlines cheap (timed waits, not polling).
//!
//! "Front of queue" and "back of queue" posts reuse the time ordering with
//! sentinel values at the extremes of the `i64` range; the shutdown sentinel
//! sits below even the front-post slot so a skip-tasks shutdown jumps the
//! entire queue.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace, warn};

use magpie_api::{AsyncError, ObjectRef};

use crate::timer::clock;
use crate::timer::state::{
    EventKind, TimedEventState, INVALID_EVENT_ID, STARTUP_EVENT_ID, TimedEventId,
};
use crate::timer::TimedEventCallback;

/// Longest single wait slice; longer deadlines are served in repeated
/// slices of this length.
const MAX_WAIT_SLICE_MS: i64 = 10_000;

/// Slot for the skip-tasks shutdown sentinel: ahead of everything.
const ABORT_FRONT_TIME: i64 = i64::MIN;
/// Slot for `post_event`: effectively "now, highest urgency".
const POST_FRONT_TIME: i64 = i64::MIN + 1;
/// Slot for `post_event_to_back`.
const POST_BACK_TIME: i64 = i64::MAX;

/// What happens to pending work when the queue shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownFlush {
    /// All pending work runs before the queue stops.
    ExecuteTasks,
    /// Pending work is abandoned immediately.
    SkipTasks,
}

/// Whether shutdown waits for the queue thread to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Block until the thread has exited and state is torn down.
    Sync,
    /// Detach the thread and return immediately; it releases resources on
    /// its own way out.
    Async,
}

struct QueueState {
    pending: VecDeque<Arc<TimedEventState>>,
    started: bool,
    stopped: bool,
    shutting_down: bool,
    thread_alive: bool,
    next_id: TimedEventId,
    thread: Option<JoinHandle<()>>,
}

struct QueueShared {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    head_changed: Condvar,
}

/// The deadline-ordered scheduler. Owner of the dedicated thread; dropping
/// it performs a synchronous skip-tasks shutdown if the queue is still
/// running.
pub struct TimedEventQueue {
    shared: Arc<QueueShared>,
}

/// Non-owning view of a [`TimedEventQueue`] carrying its posting and
/// cancellation surface. Handed to every callback so it can reschedule
/// while the owner retains teardown control.
#[derive(Clone)]
pub struct TimerHandle {
    shared: Arc<QueueShared>,
}

impl TimedEventQueue {
    /// Creates a queue in the uninitialized state; call
    /// [`startup`](Self::startup) to bring the thread up.
    pub fn new() -> TimedEventQueue {
        TimedEventQueue {
            shared: Arc::new(QueueShared {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    started: false,
                    stopped: false,
                    shutting_down: false,
                    thread_alive: false,
                    next_id: STARTUP_EVENT_ID,
                    thread: None,
                }),
                not_empty: Condvar::new(),
                head_changed: Condvar::new(),
            }),
        }
    }

    /// Starts the dedicated thread.
    ///
    /// Fails with [`AsyncError::ReEntry`] when already started, and with
    /// [`AsyncError::InvalidState`] while a previous, asynchronously
    /// shut-down thread is still draining.
    pub fn startup(&self) -> Result<(), AsyncError> {
        let mut state = self.shared.lock_state();
        if state.started {
            warn!("timed event queue startup re-entry");
            return Err(AsyncError::ReEntry);
        }
        if state.thread_alive {
            return Err(AsyncError::InvalidState(
                "previous queue thread still draining",
            ));
        }

        state.pending.clear();
        state.next_id = STARTUP_EVENT_ID;

        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("magpie-timed-events".to_string())
            .spawn(move || QueueShared::run(shared))
            .map_err(|e| AsyncError::Abort(format!("failed to spawn timer thread: {e}")))?;

        state.thread = Some(handle);
        state.thread_alive = true;
        state.started = true;
        state.stopped = false;
        state.shutting_down = false;
        debug!("timed event queue started");
        Ok(())
    }

    /// Stops the queue by posting an abort sentinel.
    ///
    /// `flush` picks the sentinel's slot: [`ShutdownFlush::ExecuteTasks`]
    /// posts it behind all pending work (with [`ShutdownMode::Sync`] the
    /// caller may block for as long as that work takes);
    /// [`ShutdownFlush::SkipTasks`] posts it ahead of everything, abandoning
    /// pending work. Fails with [`AsyncError::ReEntry`] when shutdown has
    /// already run.
    pub fn shutdown(&self, flush: ShutdownFlush, mode: ShutdownMode) -> Result<(), AsyncError> {
        {
            let mut state = self.shared.lock_state();
            if state.stopped || state.shutting_down {
                return Err(AsyncError::ReEntry);
            }
            if !state.started {
                return Err(AsyncError::NotInitialized);
            }

            state.shutting_down = true;
            state.started = false; // reject further posts

            if mode == ShutdownMode::Async {
                // Detach: the thread tears down on its own way out.
                let _ = state.thread.take();
            }

            let slot = match flush {
                ShutdownFlush::ExecuteTasks => POST_BACK_TIME,
                ShutdownFlush::SkipTasks => ABORT_FRONT_TIME,
            };
            let sentinel = TimedEventState::new_abort();
            self.shared.insert_locked(&mut state, sentinel, slot);
            debug!(?flush, ?mode, "posted queue abort");
        }

        if mode == ShutdownMode::Sync {
            let handle = self.shared.lock_state().thread.take();
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    warn!("timed event thread panicked before exit");
                }
            }
            let mut state = self.shared.lock_state();
            state.pending.clear();
            state.stopped = true;
        }
        Ok(())
    }

    /// `shutdown(SkipTasks, Sync)` shorthand.
    pub fn shutdown_sync(&self) -> Result<(), AsyncError> {
        self.shutdown(ShutdownFlush::SkipTasks, ShutdownMode::Sync)
    }

    /// `shutdown(SkipTasks, Async)` shorthand.
    pub fn shutdown_async(&self) -> Result<(), AsyncError> {
        self.shutdown(ShutdownFlush::SkipTasks, ShutdownMode::Async)
    }

    /// Returns a cloneable, non-owning handle to this queue.
    pub fn handle(&self) -> TimerHandle {
        TimerHandle {
            shared: self.shared.clone(),
        }
    }

    /// Posts `event` for immediate execution, ahead of all delayed and
    /// back-of-queue entries; FIFO with other immediate posts.
    pub fn post_event(&self, event: &Arc<TimedEventState>) -> Result<TimedEventId, AsyncError> {
        self.shared.post_timed(event, POST_FRONT_TIME)
    }

    /// Posts `event` behind everything currently pending.
    pub fn post_event_to_back(
        &self,
        event: &Arc<TimedEventState>,
    ) -> Result<TimedEventId, AsyncError> {
        self.shared.post_timed(event, POST_BACK_TIME)
    }

    /// Posts `event` to run `delay_ms` milliseconds from now.
    pub fn post_event_with_delay(
        &self,
        event: &Arc<TimedEventState>,
        delay_ms: u32,
    ) -> Result<TimedEventId, AsyncError> {
        self.shared
            .post_timed(event, clock::now_millis() + i64::from(delay_ms))
    }

    /// Removes a pending event by id. Fails with [`AsyncError::NotFound`]
    /// when the id is no longer pending (already executed or cancelled).
    pub fn cancel_event(&self, id: TimedEventId) -> Result<(), AsyncError> {
        self.shared.cancel_event(id)
    }

    /// Removes every pending event.
    pub fn cancel_all_events(&self) -> Result<(), AsyncError> {
        self.shared.cancel_all_events()
    }

    /// Number of entries waiting to execute.
    pub fn pending_event_count(&self) -> usize {
        self.shared.pending_event_count()
    }

    /// Wraps `callback` (and an optional payload) in a state entry and posts
    /// it for immediate execution.
    pub fn post_callback(
        &self,
        callback: Arc<dyn TimedEventCallback>,
        object: Option<ObjectRef>,
    ) -> Result<TimedEventId, AsyncError> {
        self.post_event(&TimedEventState::new(Some(callback), object))
    }

    /// Wraps `callback` in a state entry and posts it with a delay.
    pub fn post_callback_with_delay(
        &self,
        callback: Arc<dyn TimedEventCallback>,
        object: Option<ObjectRef>,
        delay_ms: u32,
    ) -> Result<TimedEventId, AsyncError> {
        self.post_event_with_delay(&TimedEventState::new(Some(callback), object), delay_ms)
    }

    /// Cancels everything pending, then posts `callback` for immediate
    /// execution. The queue holds only this entry afterwards.
    pub fn post_callback_replacing_all(
        &self,
        callback: Arc<dyn TimedEventCallback>,
        object: Option<ObjectRef>,
    ) -> Result<TimedEventId, AsyncError> {
        self.cancel_all_events()?;
        self.post_callback(callback, object)
    }

    /// Cancels everything pending, then posts `callback` with a delay.
    pub fn post_callback_with_delay_replacing_all(
        &self,
        callback: Arc<dyn TimedEventCallback>,
        object: Option<ObjectRef>,
        delay_ms: u32,
    ) -> Result<TimedEventId, AsyncError> {
        self.cancel_all_events()?;
        self.post_callback_with_delay(callback, object, delay_ms)
    }
}

impl Default for TimedEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimedEventQueue {
    fn drop(&mut self) {
        // Deterministic teardown: abandon pending work and wait for the
        // thread unless shutdown already ran.
        let _ = self.shutdown(ShutdownFlush::SkipTasks, ShutdownMode::Sync);
    }
}

impl std::fmt::Debug for TimedEventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock_state();
        f.debug_struct("TimedEventQueue")
            .field("pending", &state.pending.len())
            .field("started", &state.started)
            .field("stopped", &state.stopped)
            .finish()
    }
}

impl TimerHandle {
    /// See [`TimedEventQueue::post_event`].
    pub fn post_event(&self, event: &Arc<TimedEventState>) -> Result<TimedEventId, AsyncError> {
        self.shared.post_timed(event, POST_FRONT_TIME)
    }

    /// See [`TimedEventQueue::post_event_to_back`].
    pub fn post_event_to_back(
        &self,
        event: &Arc<TimedEventState>,
    ) -> Result<TimedEventId, AsyncError> {
        self.shared.post_timed(event, POST_BACK_TIME)
    }

    /// See [`TimedEventQueue::post_event_with_delay`].
    pub fn post_event_with_delay(
        &self,
        event: &Arc<TimedEventState>,
        delay_ms: u32,
    ) -> Result<TimedEventId, AsyncError> {
        self.shared
            .post_timed(event, clock::now_millis() + i64::from(delay_ms))
    }

    /// See [`TimedEventQueue::post_callback`].
    pub fn post_callback(
        &self,
        callback: Arc<dyn TimedEventCallback>,
        object: Option<ObjectRef>,
    ) -> Result<TimedEventId, AsyncError> {
        self.post_event(&TimedEventState::new(Some(callback), object))
    }

    /// See [`TimedEventQueue::post_callback_with_delay`].
    pub fn post_callback_with_delay(
        &self,
        callback: Arc<dyn TimedEventCallback>,
        object: Option<ObjectRef>,
        delay_ms: u32,
    ) -> Result<TimedEventId, AsyncError> {
        self.post_event_with_delay(&TimedEventState::new(Some(callback), object), delay_ms)
    }

    /// See [`TimedEventQueue::cancel_event`].
    pub fn cancel_event(&self, id: TimedEventId) -> Result<(), AsyncError> {
        self.shared.cancel_event(id)
    }

    /// See [`TimedEventQueue::cancel_all_events`].
    pub fn cancel_all_events(&self) -> Result<(), AsyncError> {
        self.shared.cancel_all_events()
    }

    /// See [`TimedEventQueue::pending_event_count`].
    pub fn pending_event_count(&self) -> usize {
        self.shared.pending_event_count()
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("pending", &self.pending_event_count())
            .finish()
    }
}

impl QueueShared {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().expect("timed event queue lock poisoned")
    }

    fn post_timed(
        &self,
        event: &Arc<TimedEventState>,
        time: i64,
    ) -> Result<TimedEventId, AsyncError> {
        let mut state = self.lock_state();
        if !state.started {
            return Err(AsyncError::NotInitialized);
        }
        Ok(self.insert_locked(&mut state, event.clone(), time))
    }

    /// Assigns a fresh id and splices `event` into the time-sorted pending
    /// list: after every entry with a less-or-equal time, before the first
    /// strictly greater one. Caller holds the queue lock.
    fn insert_locked(
        &self,
        state: &mut QueueState,
        event: Arc<TimedEventState>,
        time: i64,
    ) -> TimedEventId {
        let id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1);
        if state.next_id == INVALID_EVENT_ID {
            state.next_id = STARTUP_EVENT_ID;
        }
        event.set_event_id(id);
        event.set_time(time);

        let index = state.pending.partition_point(|e| e.time() <= time);
        let new_head = index == 0;
        state.pending.insert(index, event);
        trace!(id, time, index, pending = state.pending.len(), "timed event posted");

        if new_head {
            // Interrupt a wait that targets the previous, later head.
            self.head_changed.notify_one();
        }
        self.not_empty.notify_one();
        id
    }

    fn cancel_event(&self, id: TimedEventId) -> Result<(), AsyncError> {
        if id == INVALID_EVENT_ID {
            return Err(AsyncError::InvalidArgument("event id"));
        }

        let mut state = self.lock_state();
        trace!(id, pending = state.pending.len(), "cancel event");
        match state.pending.iter().position(|e| e.event_id() == id) {
            Some(index) => {
                if index == 0 {
                    // The wait in progress targets this entry; re-evaluate.
                    self.head_changed.notify_one();
                }
                let event = state.pending.remove(index).expect("index in bounds");
                event.set_event_id(INVALID_EVENT_ID);
                Ok(())
            }
            None => Err(AsyncError::NotFound),
        }
    }

    fn cancel_all_events(&self) -> Result<(), AsyncError> {
        let mut state = self.lock_state();
        debug!(pending = state.pending.len(), "cancel all events");
        self.head_changed.notify_one();
        for event in state.pending.drain(..) {
            event.set_event_id(INVALID_EVENT_ID);
        }
        Ok(())
    }

    fn pending_event_count(&self) -> usize {
        self.lock_state().pending.len()
    }

    /// Body of the dedicated queue thread.
    fn run(shared: Arc<QueueShared>) {
        trace!("timed event thread running");
        loop {
            let mut due: Option<Arc<TimedEventState>> = None;
            {
                let mut state = shared.lock_state();
                if state.stopped {
                    state.pending.clear();
                    break;
                }

                while state.pending.is_empty() {
                    state = shared
                        .not_empty
                        .wait(state)
                        .expect("timed event queue lock poisoned");
                }

                let mut event_id = INVALID_EVENT_ID;
                loop {
                    let Some(head) = state.pending.front().cloned() else {
                        // Cleared while this thread waited.
                        debug!("pending list drained during wait");
                        break;
                    };
                    event_id = head.event_id();

                    let request = head.time();
                    let sleep_ms = if request < 0 || request == POST_BACK_TIME {
                        // Sentinel slots are due the moment they reach the head.
                        0
                    } else {
                        request.saturating_sub(clock::now_millis())
                    };
                    if sleep_ms <= 0 {
                        break;
                    }

                    let capped = sleep_ms > MAX_WAIT_SLICE_MS;
                    let wait_for = Duration::from_millis(sleep_ms.min(MAX_WAIT_SLICE_MS) as u64);
                    trace!(event_id, sleep_ms, capped, "waiting for head deadline");
                    let (guard, timeout) = shared
                        .head_changed
                        .wait_timeout(state, wait_for)
                        .expect("timed event queue lock poisoned");
                    state = guard;
                    if !capped && timeout.timed_out() {
                        break;
                    }
                    // Woken early or slice elapsed: the head may have been
                    // preempted by an earlier deadline or cancelled; loop
                    // and re-evaluate it.
                }

                // The head may have been cancelled while this thread waited;
                // remove-by-id confirms it is still pending.
                if event_id != INVALID_EVENT_ID {
                    if let Some(index) = state.pending.iter().position(|e| e.event_id() == event_id)
                    {
                        due = state.pending.remove(index);
                    }
                }
            }

            // Lock released: posts and cancellations proceed concurrently
            // with the callback.
            if let Some(event) = due {
                match event.kind() {
                    EventKind::Invoke => {
                        if let Some(callback) = event.callback() {
                            trace!(id = event.event_id(), "executing timed event");
                            let handle = TimerHandle {
                                shared: shared.clone(),
                            };
                            callback.invoke(&event, &handle);
                        }
                    }
                    EventKind::Abort => {
                        debug!("queue abort consumed");
                        shared.lock_state().stopped = true;
                    }
                }
            }
        }

        let mut state = shared.lock_state();
        state.thread_alive = false;
        trace!("timed event thread ended");
    }
}

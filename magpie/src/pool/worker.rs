//! # Worker Thread Implementation
//!
//! A [`ThreadWorker`] couples one OS thread with one mutable task queue.
//! Submissions insert at one of three priority points; the thread pops from
//! the head, runs each callback to completion, and parks on a manual-reset
//! wake event between bursts. With an idle timeout configured the thread
//! retires itself after that long without work and is respawned transparently
//! by the next submission.
//!
//! ## Ordering
//!
//! Within one worker, tasks execute in priority-adjusted FIFO order. An exit
//! request always cuts to the front of the queue, so shutdown preempts any
//! queued work.
//!
//! ## Locking
//!
//! The queue is mutated only under the worker's own lock, and the lock is
//! never held across a callback invocation. The wake event is signaled and
//! reset only while that lock is held, which makes "reset when the queue is
//! observed empty" atomic against concurrent submissions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use magpie_api::{AsyncError, WorkPriority};

use crate::pool::envelope::WorkItem;
use crate::sync::WakeEvent;

struct WorkerState {
    queue: VecDeque<WorkItem>,
    started: bool,
    running: bool,
    idle_timeout: Option<Duration>,
}

struct WorkerShared {
    name: Option<String>,
    state: Mutex<WorkerState>,
    wake: WakeEvent,
    exec_started_at: Mutex<Option<Instant>>,
}

/// One OS thread plus its private, priority-ordered task queue.
pub struct ThreadWorker {
    shared: Arc<WorkerShared>,
}

impl ThreadWorker {
    /// Creates a worker. The queue and thread come to life in
    /// [`startup`](Self::startup).
    pub fn new(name: Option<String>) -> ThreadWorker {
        ThreadWorker {
            shared: Arc::new(WorkerShared {
                name,
                state: Mutex::new(WorkerState {
                    queue: VecDeque::new(),
                    started: false,
                    running: false,
                    idle_timeout: None,
                }),
                wake: WakeEvent::new(),
                exec_started_at: Mutex::new(None),
            }),
        }
    }

    /// Brings the task queue up. With `delay_run` the OS thread is spawned
    /// lazily by the first [`put_item`](Self::put_item) instead of here.
    ///
    /// Fails with [`AsyncError::ReEntry`] when already started.
    pub fn startup(&self, delay_run: bool) -> Result<(), AsyncError> {
        let mut state = self.lock_state();
        if state.started {
            warn!(worker = self.name(), "task queue startup re-entry");
            return Err(AsyncError::ReEntry);
        }
        state.started = true;

        if !delay_run {
            if let Err(e) = self.start_thread(&mut state) {
                state.started = false;
                return Err(e);
            }
        }
        trace!(worker = self.name(), delay_run, "task queue started");
        Ok(())
    }

    /// Requests worker termination: enqueues an exit envelope at the front
    /// of the queue — bypassing priority rules — and signals the thread.
    /// Does not block for thread termination.
    pub fn shutdown(&self) -> Result<(), AsyncError> {
        let mut state = self.lock_state();
        if !state.started {
            return Err(AsyncError::NotInitialized);
        }
        state.queue.push_front(WorkItem::RequestExit);
        self.shared.wake.set();
        debug!(worker = self.name(), "task queue shutdown requested");
        Ok(())
    }

    /// Inserts `item` at the queue position selected by `priority` and
    /// wakes the thread, respawning it first if it has retired.
    ///
    /// Fails with [`AsyncError::NotInitialized`] before startup and with
    /// [`AsyncError::Abort`] when the OS thread could not be spawned.
    pub fn put_item(&self, item: WorkItem, priority: WorkPriority) -> Result<(), AsyncError> {
        let mut state = self.lock_state();
        if !state.started {
            return Err(AsyncError::NotInitialized);
        }

        if !state.running {
            self.start_thread(&mut state)?;
        }

        let pending = state.queue.len();
        trace!(worker = self.name(), pending, ?priority, "put item");
        match priority {
            WorkPriority::Normal => state.queue.push_back(item),
            WorkPriority::Elevated => {
                let pos = pending / 2;
                if pos == 0 {
                    state.queue.push_back(item);
                } else {
                    state.queue.insert(pos, item);
                }
            }
            WorkPriority::Realtime => state.queue.push_front(item),
        }

        // A non-empty queue means the thread is already looping and needs no
        // re-signal.
        if pending == 0 {
            self.shared.wake.set();
        }
        Ok(())
    }

    /// Number of items pending in the queue.
    pub fn item_count(&self) -> usize {
        let state = self.lock_state();
        if !state.started {
            return 0;
        }
        state.queue.len()
    }

    /// Sets the idle timeout after which the worker retires its thread.
    /// `None` keeps the thread parked indefinitely.
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        let mut state = self.lock_state();
        state.idle_timeout = timeout;
    }

    /// Time the currently executing task has been running, or `None` while
    /// the worker is idle.
    pub fn execute_elapsed(&self) -> Option<Duration> {
        self.shared
            .exec_started_at
            .lock()
            .expect("worker exec-clock lock poisoned")
            .map(|started| started.elapsed())
    }

    fn name(&self) -> &str {
        self.shared.name.as_deref().unwrap_or("worker")
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, WorkerState> {
        self.shared.state.lock().expect("worker queue lock poisoned")
    }

    /// Spawns the worker thread. Caller holds the state lock.
    fn start_thread(&self, state: &mut WorkerState) -> Result<(), AsyncError> {
        if state.running {
            return Ok(());
        }

        let shared = self.shared.clone();
        let mut builder = thread::Builder::new();
        if let Some(name) = &self.shared.name {
            builder = builder.name(name.clone());
        }
        builder
            .spawn(move || WorkerShared::run(shared))
            .map_err(|e| AsyncError::Abort(format!("failed to spawn worker thread: {e}")))?;

        state.running = true;
        Ok(())
    }
}

impl std::fmt::Debug for ThreadWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("ThreadWorker")
            .field("name", &self.shared.name)
            .field("pending", &state.queue.len())
            .field("running", &state.running)
            .finish()
    }
}

impl WorkerShared {
    /// Main loop of the worker thread. The thread keeps its own strong
    /// reference to the shared state, so a retired worker object stays valid
    /// until both the owner and the thread are done with it.
    fn run(shared: Arc<WorkerShared>) {
        let name = shared.name.as_deref().unwrap_or("worker");
        trace!(worker = name, "worker thread running");

        // Set after executing a task that left the queue non-empty: the next
        // envelope is processed immediately, without a blocking wait.
        let mut skip_wait = false;

        loop {
            let mut timed_out = false;
            if !skip_wait {
                let timeout = {
                    let state = shared.state.lock().expect("worker queue lock poisoned");
                    state.idle_timeout
                };
                match timeout {
                    Some(t) => timed_out = !shared.wake.wait_timeout(t),
                    None => shared.wake.wait(),
                }
            }
            skip_wait = false;

            if timed_out {
                let mut state = shared.state.lock().expect("worker queue lock poisoned");
                if state.queue.is_empty() {
                    state.running = false;
                    trace!(worker = name, "idle timeout, retiring thread");
                    break;
                }
                // A task arrived during the timeout race; go take it.
                continue;
            }

            let item = {
                let mut state = shared.state.lock().expect("worker queue lock poisoned");
                match state.queue.pop_front() {
                    Some(item) => Some(item),
                    None => {
                        // Signaled with nothing queued: lower the flag and
                        // wait again. Resetting under the queue lock keeps
                        // this atomic against concurrent submissions.
                        shared.wake.reset();
                        None
                    }
                }
            };
            let Some(item) = item else {
                debug!(worker = name, "woke with empty queue");
                continue;
            };

            match item {
                WorkItem::RequestExit => {
                    let mut state = shared.state.lock().expect("worker queue lock poisoned");
                    let discarded = state.queue.len();
                    state.queue.clear();
                    state.running = false;
                    debug!(worker = name, discarded, "exit requested, terminating thread");
                    break;
                }
                WorkItem::Execute(result) => {
                    let callback = result.callback();

                    trace!(worker = name, "executing callback");
                    *shared
                        .exec_started_at
                        .lock()
                        .expect("worker exec-clock lock poisoned") = Some(Instant::now());
                    callback.execute(&result);
                    *shared
                        .exec_started_at
                        .lock()
                        .expect("worker exec-clock lock poisoned") = None;
                    trace!(worker = name, "callback finished");

                    // Release the in-flight references before re-checking
                    // the queue.
                    drop(callback);
                    drop(result);

                    let state = shared.state.lock().expect("worker queue lock poisoned");
                    if state.queue.is_empty() {
                        shared.wake.reset();
                    } else {
                        skip_wait = true;
                    }
                }
            }
        }
        trace!(worker = name, "worker thread ended");
    }
}

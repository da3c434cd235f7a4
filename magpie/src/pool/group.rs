//! # Shared Worker Pool
//!
//! A [`GroupWorker`] is the unit handed to callers as an opaque pool handle.
//! It admits every submission immediately: below the thread cap it prefers
//! an idle worker and otherwise grows the pool; at the cap it falls back to
//! the worker with the fewest pending items. This is greedy per-submission
//! load spreading, not a global optimum — a slow callback starves only the
//! one worker executing it, which is exactly why idle workers are preferred
//! over queue depth.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, trace, warn};

use magpie_api::{AsyncError, AsyncResult, WorkPriority};

use crate::pool::envelope::WorkItem;
use crate::pool::worker::ThreadWorker;

/// How long a worker waits without new work before retiring its OS thread.
const IDLE_EXIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Thread-count policy for a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadLimit {
    /// Size the pool to `cpu_count + 1` threads.
    Auto,
    /// Cap the pool at exactly this many threads. `Fixed(0)` behaves like
    /// [`ThreadLimit::Auto`].
    Fixed(usize),
    /// Grow a thread per concurrently busy submission, without bound.
    Unbounded,
}

#[derive(Debug, Clone, Copy)]
enum MaxThreads {
    Bounded(usize),
    Unbounded,
}

struct GroupState {
    workers: Vec<ThreadWorker>,
    max_threads: MaxThreads,
    name: Option<String>,
    started: bool,
    shut_down: bool,
}

/// A pool of [`ThreadWorker`]s with an admission and load-balancing policy.
pub struct GroupWorker {
    state: Mutex<GroupState>,
}

impl GroupWorker {
    pub fn new() -> GroupWorker {
        GroupWorker {
            state: Mutex::new(GroupState {
                workers: Vec::new(),
                max_threads: MaxThreads::Bounded(1),
                name: None,
                started: false,
                shut_down: false,
            }),
        }
    }

    /// Starts the pool with one lazily-started worker.
    ///
    /// Fails with [`AsyncError::InvalidState`] while the pool is already
    /// active. A pool that has been shut down may be started again.
    pub fn startup(&self, limit: ThreadLimit, name: Option<&str>) -> Result<(), AsyncError> {
        let mut state = self.lock_state();
        if state.started && !state.shut_down {
            return Err(AsyncError::InvalidState("pool already started"));
        }

        let max_threads = match limit {
            ThreadLimit::Unbounded => MaxThreads::Unbounded,
            ThreadLimit::Auto | ThreadLimit::Fixed(0) => {
                MaxThreads::Bounded((num_cpus::get() + 1).max(1))
            }
            ThreadLimit::Fixed(n) => MaxThreads::Bounded(n),
        };
        debug!(pool = name, ?max_threads, "pool startup");

        state.name = name.map(str::to_string);

        let worker = ThreadWorker::new(Self::worker_thread_name(state.name.as_deref(), 0));
        worker.set_timeout(Some(IDLE_EXIT_TIMEOUT));
        worker.startup(true)?;

        state.workers.push(worker);
        state.max_threads = max_threads;
        state.started = true;
        state.shut_down = false;
        Ok(())
    }

    /// Shuts every live worker's task queue down (asynchronously — worker
    /// threads are not joined) and clears the collection. Subsequent
    /// submissions fail with [`AsyncError::Shutdown`].
    pub fn shutdown(&self) -> Result<(), AsyncError> {
        let mut state = self.lock_state();
        if !state.started {
            return Err(AsyncError::NotInitialized);
        }
        if state.shut_down {
            return Err(AsyncError::Shutdown);
        }

        debug!(
            pool = state.name.as_deref(),
            workers = state.workers.len(),
            "pool shutdown"
        );
        for worker in &state.workers {
            if let Err(e) = worker.shutdown() {
                warn!(pool = state.name.as_deref(), error = %e, "worker refused shutdown");
            }
        }
        state.workers.clear();
        state.shut_down = true;
        Ok(())
    }

    /// Wraps `result` in an execute envelope and dispatches it, with
    /// [`WorkPriority::Realtime`] when `realtime` is set.
    pub fn put_work_item(&self, result: Arc<AsyncResult>, realtime: bool) -> Result<(), AsyncError> {
        let mut state = self.lock_state();
        if !state.started {
            return Err(AsyncError::NotInitialized);
        }
        if state.shut_down {
            return Err(AsyncError::Shutdown);
        }

        let priority = if realtime {
            WorkPriority::Realtime
        } else {
            WorkPriority::Normal
        };
        Self::dispatch(&mut state, WorkItem::Execute(result), priority)
    }

    /// Number of workers currently in the pool.
    pub fn current_threads(&self) -> usize {
        self.lock_state().workers.len()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, GroupState> {
        self.state.lock().expect("pool lock poisoned")
    }

    fn worker_thread_name(pool_name: Option<&str>, index: usize) -> Option<String> {
        pool_name.map(|name| format!("{name}-worker-{index}"))
    }

    /// Per-submission load balancing, executed under the pool's lock.
    fn dispatch(
        state: &mut GroupState,
        item: WorkItem,
        priority: WorkPriority,
    ) -> Result<(), AsyncError> {
        let count = state.workers.len();
        let below_cap = match state.max_threads {
            MaxThreads::Unbounded => true,
            MaxThreads::Bounded(max) => count < max,
        };

        if below_cap {
            // Prefer a worker with nothing pending before growing the pool.
            if let Some(worker) = state.workers.iter().find(|w| w.item_count() == 0) {
                trace!(count, "dispatch to idle worker");
                return worker.put_item(item, priority);
            }

            trace!(count, "dispatch to new worker");
            let worker = ThreadWorker::new(Self::worker_thread_name(state.name.as_deref(), count));
            worker.set_timeout(Some(IDLE_EXIT_TIMEOUT));
            worker.startup(false)?;
            if let Err(e) = worker.put_item(item, priority) {
                // Tear the half-built worker down rather than leak its thread.
                let _ = worker.shutdown();
                return Err(e);
            }
            state.workers.push(worker);
            Ok(())
        } else if count == 1 {
            state.workers[0].put_item(item, priority)
        } else {
            // Saturated: first idle worker wins, else fewest pending items
            // (first encountered wins ties).
            let mut target = 0;
            let mut fewest = usize::MAX;
            for (index, worker) in state.workers.iter().enumerate() {
                let pending = worker.item_count();
                if pending == 0 {
                    target = index;
                    break;
                }
                if pending < fewest {
                    fewest = pending;
                    target = index;
                }
            }
            trace!(count, target, "dispatch to least-loaded worker");
            state.workers[target].put_item(item, priority)
        }
    }
}

impl Default for GroupWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GroupWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("GroupWorker")
            .field("name", &state.name)
            .field("workers", &state.workers.len())
            .field("max_threads", &state.max_threads)
            .field("shut_down", &state.shut_down)
            .finish()
    }
}

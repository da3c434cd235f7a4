//! # Worker Handles and Global Default Queues
//!
//! This module is the crate's embedding surface: refcounted [`WorkerHandle`]s
//! around pools, and the two process-wide default pools (one single-thread
//! "serial", one auto-sized "parallel") behind a refcounted lazy lifecycle.
//!
//! Prefer constructing a [`GroupWorker`](crate::pool::GroupWorker) and
//! passing it explicitly where you can; the global pools exist for
//! fire-and-forget [`invoke_callback`] call sites that hold no handle at
//! all. [`WorkerSelector`] picks between a real handle and the two global
//! pools at submission time.

use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use tracing::{debug, warn};

use magpie_api::{AsyncCallback, AsyncError, AsyncResult, ObjectRef};

use crate::pool::{GroupWorker, ThreadLimit};

struct WorkerObject {
    worker: GroupWorker,
    name: Option<String>,
    limit: ThreadLimit,
}

impl Drop for WorkerObject {
    fn drop(&mut self) {
        // Last handle gone: shut the pool down. Worker threads drain
        // asynchronously — this never blocks.
        if let Err(e) = self.worker.shutdown() {
            warn!(pool = self.name.as_deref(), error = %e, "pool teardown skipped");
        }
    }
}

/// Refcounted, cloneable handle to a worker pool.
///
/// Cloning takes an additional reference; dropping the last clone shuts the
/// pool down asynchronously (the call returns before all worker threads have
/// exited).
#[derive(Clone)]
pub struct WorkerHandle {
    inner: Arc<WorkerObject>,
}

impl WorkerHandle {
    /// The thread limit requested at creation (the request, not the
    /// resolved count — a serial pool created from `Fixed(8)` still
    /// reports `Fixed(8)`).
    pub fn max_threads(&self) -> ThreadLimit {
        self.inner.limit
    }

    /// The name given at creation, if any.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Number of workers currently in the pool.
    pub fn current_threads(&self) -> usize {
        self.inner.worker.current_threads()
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("name", &self.inner.name)
            .field("limit", &self.inner.limit)
            .finish()
    }
}

/// Creates a pool and wraps it in a handle.
///
/// `parallel = false` forces a single-thread pool regardless of `limit`.
/// A one-character name is treated as a placeholder and not used for thread
/// naming, though it is still reported by [`WorkerHandle::name`].
pub fn create_worker(
    parallel: bool,
    limit: ThreadLimit,
    name: Option<&str>,
) -> Result<WorkerHandle, AsyncError> {
    let worker = GroupWorker::new();
    let pool_name = name.filter(|n| n.len() > 1);
    let effective = if parallel { limit } else { ThreadLimit::Fixed(1) };
    worker.startup(effective, pool_name)?;

    Ok(WorkerHandle {
        inner: Arc::new(WorkerObject {
            worker,
            name: name.map(String::from),
            limit,
        }),
    })
}

/// Releases one reference to the pool; the explicit spelling of dropping
/// the handle.
pub fn destroy_worker(handle: WorkerHandle) {
    drop(handle);
}

/// Selects the submission target for [`put_work_item_ex`]: one of the two
/// process-wide default pools, or a caller-held handle.
#[derive(Debug, Clone, Copy)]
pub enum WorkerSelector<'a> {
    /// The global single-thread default pool.
    Serial,
    /// The global auto-sized default pool.
    Parallel,
    /// A pool the caller created with [`create_worker`].
    Worker(&'a WorkerHandle),
}

#[derive(Default)]
struct GlobalQueues {
    ref_count: usize,
    serial: Option<WorkerHandle>,
    parallel: Option<WorkerHandle>,
}

lazy_static! {
    static ref GLOBAL_QUEUES: Mutex<GlobalQueues> = Mutex::new(GlobalQueues::default());
}

fn lock_global() -> std::sync::MutexGuard<'static, GlobalQueues> {
    GLOBAL_QUEUES.lock().expect("global queue lock poisoned")
}

/// Takes a reference to the global default queues, creating them on the
/// 0 → 1 transition: a 1-thread serial pool and an auto-sized parallel pool.
pub fn startup() -> Result<(), AsyncError> {
    let mut global = lock_global();
    if global.ref_count == 0 {
        debug!("creating global default queues");
        let serial = create_worker(false, ThreadLimit::Fixed(1), Some("magpie-serial"))?;
        let parallel = create_worker(true, ThreadLimit::Auto, Some("magpie-parallel"))?;
        global.serial = Some(serial);
        global.parallel = Some(parallel);
    }
    global.ref_count += 1;
    Ok(())
}

/// Releases one reference to the global default queues, tearing both down
/// on the 1 → 0 transition. An unmatched call is logged and ignored.
pub fn shutdown() {
    let mut global = lock_global();
    if global.ref_count == 0 {
        warn!("global shutdown without matching startup");
        return;
    }
    global.ref_count -= 1;
    if global.ref_count == 0 {
        debug!("destroying global default queues");
        global.serial = None;
        global.parallel = None;
    }
}

/// Alias for [`startup`].
pub fn lock_ref() -> Result<(), AsyncError> {
    startup()
}

/// Alias for [`shutdown`].
pub fn unlock_ref() {
    shutdown()
}

/// Submits `result` to the selected pool.
///
/// Fails with [`AsyncError::NotInitialized`] when a global selector is used
/// before [`startup`], and propagates the pool's own submission errors.
pub fn put_work_item_ex(
    selector: WorkerSelector<'_>,
    result: &Arc<AsyncResult>,
) -> Result<(), AsyncError> {
    match selector {
        WorkerSelector::Worker(handle) => handle.inner.worker.put_work_item(result.clone(), false),
        WorkerSelector::Serial => {
            let global = lock_global();
            match &global.serial {
                Some(handle) => handle.inner.worker.put_work_item(result.clone(), false),
                None => Err(AsyncError::NotInitialized),
            }
        }
        WorkerSelector::Parallel => {
            let global = lock_global();
            match &global.parallel {
                Some(handle) => handle.inner.worker.put_work_item(result.clone(), false),
                None => Err(AsyncError::NotInitialized),
            }
        }
    }
}

/// Convenience: wraps `callback` and `state` in a fresh result and submits
/// it to the selected pool.
pub fn put_work_item(
    selector: WorkerSelector<'_>,
    callback: Arc<dyn AsyncCallback>,
    state: Option<ObjectRef>,
) -> Result<(), AsyncError> {
    let result = AsyncResult::new(callback, state, None);
    put_work_item_ex(selector, &result)
}

/// Dispatches `result` to the global parallel default pool.
pub fn invoke_callback(result: &Arc<AsyncResult>) -> Result<(), AsyncError> {
    put_work_item_ex(WorkerSelector::Parallel, result)
}

/// RAII reference to the global default queues: takes one on construction,
/// releases it on drop.
pub struct AsyncScope {
    _private: (),
}

impl AsyncScope {
    pub fn new() -> Result<AsyncScope, AsyncError> {
        startup()?;
        Ok(AsyncScope { _private: () })
    }
}

impl Drop for AsyncScope {
    fn drop(&mut self) {
        shutdown();
    }
}

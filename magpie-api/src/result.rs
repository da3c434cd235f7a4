//! # Task Result Protocol
//!
//! An [`AsyncResult`] is a one-shot, reference-counted carrier for a task:
//! it owns the callback that will consume it, an optional caller-provided
//! `state` payload, an optional `object` payload for the outcome, and a
//! settable status code. The instance is created at submission time, handed
//! to a scheduler, and destroyed when the last reference (caller plus any
//! in-flight queue entry) is dropped.
//!
//! ## Completion pattern
//!
//! A scheduler executes a result by invoking its callback synchronously with
//! the result itself as the argument. The callback is expected to call
//! [`AsyncResult::set_status`] / [`AsyncResult::set_object`] before returning
//! if it wants to report an outcome, and then typically chains delivery into
//! a second, *external* `AsyncResult` owned by the consumer. That
//! indirection lets a component hide its internal task representation from
//! the consumer's callback.
//!
//! Exactly one callback invocation consumes an instance; serializing
//! multiple submissions of the same instance is the caller's responsibility.

use std::sync::{Arc, Mutex};

use crate::error::{AsyncError, TaskStatus};
use crate::object::ObjectRef;

/// A unit of work executable by a scheduler.
///
/// Implementations run to completion on whichever scheduler thread picks
/// them up; a slow callback starves only that thread. The scheduler installs
/// no panic boundary around the invocation.
pub trait AsyncCallback: Send + Sync {
    /// Consumes `result`, reporting any outcome through it.
    fn execute(&self, result: &AsyncResult);
}

impl<F> AsyncCallback for F
where
    F: Fn(&AsyncResult) + Send + Sync,
{
    fn execute(&self, result: &AsyncResult) {
        self(result)
    }
}

/// Mutable interior of an [`AsyncResult`], guarded by its per-instance lock
/// so concurrent setters and getters from different threads are race-free.
struct ResultInner {
    status: TaskStatus,
    object: Option<ObjectRef>,
    state: Option<ObjectRef>,
}

/// One-shot future object binding a callback to its state and outcome.
///
/// Shared via `Arc`; every hand-off clones the `Arc` (retain) and drops it
/// when done (release). The callback is fixed at construction — only the
/// status and the outcome object are settable afterwards.
pub struct AsyncResult {
    callback: Arc<dyn AsyncCallback>,
    inner: Mutex<ResultInner>,
}

impl AsyncResult {
    /// Creates a result carrying `callback`, an optional `state` payload and
    /// an optional initial outcome `object`.
    pub fn new(
        callback: Arc<dyn AsyncCallback>,
        state: Option<ObjectRef>,
        object: Option<ObjectRef>,
    ) -> Arc<AsyncResult> {
        Arc::new(AsyncResult {
            callback,
            inner: Mutex::new(ResultInner {
                status: Ok(()),
                object,
                state,
            }),
        })
    }

    /// Creates a result from a plain closure, without payloads.
    pub fn from_fn<F>(callback: F) -> Arc<AsyncResult>
    where
        F: Fn(&AsyncResult) + Send + Sync + 'static,
    {
        Self::new(Arc::new(callback), None, None)
    }

    /// Records the task's outcome code.
    pub fn set_status(&self, status: TaskStatus) {
        let mut inner = self.inner.lock().expect("result lock poisoned");
        inner.status = status;
    }

    /// Returns the most recently recorded outcome code.
    pub fn status(&self) -> TaskStatus {
        let inner = self.inner.lock().expect("result lock poisoned");
        inner.status.clone()
    }

    /// Replaces the outcome object, releasing the previous one if any.
    /// `None` clears it.
    pub fn set_object(&self, object: Option<ObjectRef>) {
        let mut inner = self.inner.lock().expect("result lock poisoned");
        inner.object = object;
    }

    /// Returns a retained reference to the outcome object.
    ///
    /// Fails with [`AsyncError::NotFound`] while no object has been set.
    pub fn object(&self) -> Result<ObjectRef, AsyncError> {
        let inner = self.inner.lock().expect("result lock poisoned");
        inner.object.clone().ok_or(AsyncError::NotFound)
    }

    /// Returns a retained reference to the caller-provided state payload.
    ///
    /// Fails with [`AsyncError::NotFound`] when the result was created
    /// without one.
    pub fn state(&self) -> Result<ObjectRef, AsyncError> {
        let inner = self.inner.lock().expect("result lock poisoned");
        inner.state.clone().ok_or(AsyncError::NotFound)
    }

    /// Returns a retained reference to the callback that consumes this
    /// result. Schedulers clone this out before invoking it so the
    /// result's lock is never held across the invocation.
    pub fn callback(&self) -> Arc<dyn AsyncCallback> {
        self.callback.clone()
    }
}

impl std::fmt::Debug for AsyncResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().expect("result lock poisoned");
        f.debug_struct("AsyncResult")
            .field("status", &inner.status)
            .field("has_object", &inner.object.is_some())
            .field("has_state", &inner.state.is_some())
            .finish()
    }
}

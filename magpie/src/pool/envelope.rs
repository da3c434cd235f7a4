//! Scheduling envelope consumed by worker threads.

use std::fmt;
use std::sync::Arc;

use magpie_api::AsyncResult;

/// Envelope distinguishing "run this task" from "terminate this worker".
///
/// Created once per submission (or once per worker shutdown), consumed
/// exactly once by the executing thread, then discarded.
pub enum WorkItem {
    /// Invoke the result's callback with the result itself as argument.
    Execute(Arc<AsyncResult>),
    /// Drain the queue and terminate the worker thread.
    RequestExit,
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItem::Execute(_) => f.write_str("WorkItem::Execute"),
            WorkItem::RequestExit => f.write_str("WorkItem::RequestExit"),
        }
    }
}

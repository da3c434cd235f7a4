// Magpie Scheduling Runtime
//
// This crate provides the magpie scheduling engines: a self-scaling pool of
// OS-thread workers with priority submission, a single-threaded
// deadline-ordered timed-event queue, and the process-wide default queues
// used by fire-and-forget callback invocation. The shared task/result
// protocol lives in the magpie-api crate.

pub mod logging;
pub mod pool;
pub mod runtime;
pub mod timer;

mod sync;

// Re-export the protocol surface so embedders need only one dependency.
pub use magpie_api::{
    downcast_object, object_ref, AsyncCallback, AsyncError, AsyncResult, ObjectRef, TaskStatus,
    WorkPriority,
};

pub use pool::{GroupWorker, ThreadLimit, ThreadWorker, WorkItem};
pub use runtime::{AsyncScope, WorkerHandle, WorkerSelector};
pub use timer::{
    ShutdownFlush, ShutdownMode, TimedEventCallback, TimedEventId, TimedEventQueue,
    TimedEventState, TimerHandle, INVALID_EVENT_ID,
};

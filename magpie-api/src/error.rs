//! # Runtime Error Types
//!
//! This module defines the error taxonomy shared by every magpie component:
//! the task/result protocol, the thread-pool scheduler and the timed-event
//! queue. Errors are kinds rather than numeric codes; each kind tells the
//! caller what class of recovery applies.
//!
//! ## Classification
//!
//! - Argument errors (`InvalidArgument`) are caller bugs.
//! - Lifecycle errors (`ReEntry`, `NotInitialized`, `InvalidState`,
//!   `Shutdown`) mean an operation was issued outside the component's
//!   start/stop window.
//! - `Abort` reports a concurrent structural change (for example an OS
//!   thread that could not be spawned while dispatching), `Timeout` a
//!   bounded wait that expired, `NotFound` a failed lookup by id or key.

use thiserror::Error;

/// Error type shared by all magpie scheduling components.
///
/// Submission entry points return these synchronously; work is never
/// silently dropped. Failures inside a running callback are the callback's
/// own concern and are not reported through this type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AsyncError {
    /// An argument was null-like or out of range for the operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A single-init component was started a second time, or torn down a
    /// second time.
    #[error("component re-entry: already started or already stopped")]
    ReEntry,

    /// The operation requires a component that has not been started yet.
    #[error("component is not initialized")]
    NotInitialized,

    /// The component is in a state that cannot serve the operation.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// The operation was attempted after teardown began.
    #[error("component is shut down")]
    Shutdown,

    /// A bounded wait expired without the awaited condition.
    #[error("operation timed out")]
    Timeout,

    /// A lookup by id or key matched nothing.
    #[error("not found")]
    NotFound,

    /// The operation could not proceed due to a concurrent structural
    /// change, e.g. a worker thread that failed to spawn mid-dispatch.
    #[error("aborted: {0}")]
    Abort(String),
}

/// Outcome code carried inside an [`AsyncResult`](crate::result::AsyncResult)
/// from the component that completed a task back to the callback consuming
/// it.
pub type TaskStatus = Result<(), AsyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_kind() {
        assert_eq!(
            AsyncError::InvalidArgument("callback").to_string(),
            "invalid argument: callback"
        );
        assert_eq!(AsyncError::NotFound.to_string(), "not found");
        assert_eq!(
            AsyncError::Abort("spawn failed".into()).to_string(),
            "aborted: spawn failed"
        );
    }

    #[test]
    fn task_status_defaults_compose() {
        let ok: TaskStatus = Ok(());
        assert!(ok.is_ok());
        let err: TaskStatus = Err(AsyncError::Shutdown);
        assert_eq!(err.unwrap_err(), AsyncError::Shutdown);
    }
}

//! # Thread-Pool Scheduler
//!
//! A [`GroupWorker`] owns a bounded or unbounded collection of
//! [`ThreadWorker`]s and spreads submissions across them; each
//! [`ThreadWorker`] owns one OS thread and a private task queue with three
//! priority insertion points. Idle workers retire their thread after a
//! timeout and respawn it on the next submission, so steady-state pool size
//! tracks recent concurrency rather than peak concurrency.
//!
//! Submissions never block waiting for capacity — they either dispatch to an
//! existing worker or grow the pool, pausing only on the pool's short-held
//! internal lock.

pub mod envelope;
pub mod group;
pub mod worker;

pub use envelope::WorkItem;
pub use group::{GroupWorker, ThreadLimit};
pub use worker::ThreadWorker;

//! Concurrent process-group supervision.
//!
//! A [`Task`] runs until it completes or is asked to stop, reports readiness at most once
//! and finishes with a single outcome. [`TaskHandle`] is the live control surface of a
//! spawned task, [`Group`] runs several named tasks side by side as one composite task and
//! [`SignalAdapter`] maps host termination signals onto a task's termination request.
//!
//! ```text
//!   SIGINT / SIGTERM ──► SignalAdapter ──► Group ──┬──► Member "builder"
//!                        (forward once)            │
//!                                                  └──► Member "docker_daemon"
//! ```
//!
//! All coordination is message based: readiness travels over oneshot channels, termination
//! requests are [`CancellationToken`](tokio_util::sync::CancellationToken)s and outcomes come
//! back through join handles.

mod error;
pub use error::TaskError;

pub mod task;
pub use task::{BoxTask, Ready, ReadyWait, Task, TaskFn, observe};

mod handle;
pub use handle::TaskHandle;

pub mod supervisor;
pub use supervisor::{ExitPhase, Group, GroupOutcome, Member, MemberExit};

pub mod signal;
pub use signal::{OsSignals, Signal, SignalAdapter, SignalSource};

//! # Live handle to a spawned task.
//!
//! [`TaskHandle`] owns one running [`Task`](crate::Task) on its own tokio task and exposes:
//! - a readiness notification (first observer only),
//! - an idempotent termination request ([`TaskHandle::signal`]),
//! - the final outcome ([`TaskHandle::wait`]).
//!
//! Dropping the handle requests termination, so a forgotten handle never leaves an
//! unsupervised task running.

use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace};

use crate::{
    error::TaskError,
    task::{BoxTask, Ready, ReadyWait},
};

pub struct TaskHandle {
    name: String,
    token: CancellationToken,
    ready: Option<ReadyWait>,
    join: JoinHandle<Result<(), TaskError>>,
    _guard: DropGuard,
}

impl TaskHandle {
    /// Starts `task` on its own tokio task.
    pub fn spawn(name: impl Into<String>, task: BoxTask) -> Self {
        let name = name.into();
        let token = CancellationToken::new();
        let (ready, wait) = Ready::channel();

        trace!(target: "dockstage.core.handle", task = %name, "spawn");
        let join = tokio::spawn(task.run(token.clone(), ready));

        Self {
            name,
            _guard: token.clone().drop_guard(),
            token,
            ready: Some(wait),
            join,
        }
    }

    /// Starts `task` and returns once it is ready or has already exited.
    pub async fn invoke(name: impl Into<String>, task: BoxTask) -> Self {
        let mut handle = Self::spawn(name, task);
        handle.ready().await;
        handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for readiness.
    ///
    /// Returns `false` if the task exited without becoming ready, or if readiness was
    /// already consumed by an earlier call or by [`TaskHandle::take_ready`].
    pub async fn ready(&mut self) -> bool {
        match self.ready.take() {
            Some(wait) => wait.await,
            None => false,
        }
    }

    /// Hands the readiness notification to another observer.
    pub fn take_ready(&mut self) -> Option<ReadyWait> {
        self.ready.take()
    }

    /// Requests termination. Only the first request has effect; requesting termination of
    /// a task that already exited is a no-op.
    pub fn signal(&self) {
        if !self.token.is_cancelled() {
            debug!(target: "dockstage.core.handle", task = %self.name, "termination requested");
        }
        self.token.cancel();
    }

    /// Token through which termination requests reach the task.
    pub fn termination(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the final outcome.
    pub async fn wait(self) -> Result<(), TaskError> {
        let TaskHandle {
            name, join, _guard, ..
        } = self;

        let result = match join.await {
            Ok(result) => result,
            Err(e) => Err(TaskError::Panicked {
                reason: e.to_string(),
            }),
        };
        trace!(target: "dockstage.core.handle", task = %name, ok = result.is_ok(), "exited");
        drop(_guard);
        result
    }
}

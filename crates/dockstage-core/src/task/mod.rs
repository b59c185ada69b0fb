//! # Task abstraction.
//!
//! A [`Task`] is consumed by the call to [`Task::run`]: it runs exactly once, owned by
//! whichever handle spawned it. It receives a [`CancellationToken`] carrying termination
//! requests and a [`Ready`] notifier it should fire once it has reached a usable state.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

mod ready;
pub use ready::{Ready, ReadyWait};

mod task_fn;
pub use task_fn::TaskFn;

/// # Asynchronous, cancelable unit of supervised work.
///
/// Implementations must keep observing `ctx` at every suspension point and return
/// [`TaskError::Interrupted`] when they stop because of it, unless being stopped is the
/// expected way for them to finish.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use dockstage_core::{Ready, Task, TaskError};
///
/// struct Idle;
///
/// #[async_trait]
/// impl Task for Idle {
///     async fn run(self: Box<Self>, ctx: CancellationToken, ready: Ready) -> Result<(), TaskError> {
///         ready.notify();
///         ctx.cancelled().await;
///         Err(TaskError::Interrupted)
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + 'static {
    /// Runs the task until completion or until `ctx` is cancelled.
    async fn run(self: Box<Self>, ctx: CancellationToken, ready: Ready) -> Result<(), TaskError>;
}

/// Owned, type-erased task.
pub type BoxTask = Box<dyn Task>;

#[async_trait]
impl Task for BoxTask {
    async fn run(self: Box<Self>, ctx: CancellationToken, ready: Ready) -> Result<(), TaskError> {
        (*self).run(ctx, ready).await
    }
}

/// Wraps `task` so that its readiness is also delivered to the returned [`ReadyWait`].
///
/// Lets one member of a group wait for another member's readiness while the group keeps
/// observing it as well.
pub fn observe(task: impl Task) -> (BoxTask, ReadyWait) {
    let (tap, wait) = Ready::channel();
    let observed = Observed {
        task: Box::new(task),
        tap,
    };
    (Box::new(observed), wait)
}

struct Observed {
    task: BoxTask,
    tap: Ready,
}

#[async_trait]
impl Task for Observed {
    async fn run(self: Box<Self>, ctx: CancellationToken, ready: Ready) -> Result<(), TaskError> {
        let Observed { task, tap } = *self;
        task.run(ctx, ready.join(tap)).await
    }
}

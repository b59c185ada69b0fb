//! # Function-backed task (`TaskFn`)
//!
//! [`TaskFn`] wraps a closure `F: FnOnce(CancellationToken, Ready) -> Fut`.
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use dockstage_core::{Ready, TaskError, TaskFn};
//!
//! let task = TaskFn::new(|ctx: CancellationToken, ready: Ready| async move {
//!     ready.notify();
//!     ctx.cancelled().await;
//!     Err::<(), _>(TaskError::Interrupted)
//! });
//! ```

use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::task::{BoxTask, Ready, Task};

/// Function-backed task implementation.
pub struct TaskFn<F> {
    f: F,
}

impl<F, Fut> TaskFn<F>
where
    F: FnOnce(CancellationToken, Ready) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the task and returns it type-erased.
    pub fn boxed(f: F) -> BoxTask {
        Box::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Task for TaskFn<F>
where
    F: FnOnce(CancellationToken, Ready) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    async fn run(self: Box<Self>, ctx: CancellationToken, ready: Ready) -> Result<(), TaskError> {
        (self.f)(ctx, ready).await
    }
}

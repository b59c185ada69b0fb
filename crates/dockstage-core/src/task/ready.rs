//! One-shot readiness notification.
//!
//! [`Ready`] is consumed by [`Ready::notify`], so a task can report readiness at most once.
//! Dropping it without notifying tells every waiter the task will never become ready.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::sync::oneshot;

/// Notifier half, handed to the running task.
#[derive(Debug)]
pub struct Ready {
    txs: Vec<oneshot::Sender<()>>,
}

impl Ready {
    /// Creates a connected notifier / waiter pair.
    pub fn channel() -> (Ready, ReadyWait) {
        let (tx, rx) = oneshot::channel();
        (Ready { txs: vec![tx] }, ReadyWait(rx))
    }

    /// A notifier nobody listens to.
    pub fn noop() -> Ready {
        Ready { txs: Vec::new() }
    }

    /// Merges two notifiers: notifying the result notifies both.
    pub fn join(mut self, other: Ready) -> Ready {
        self.txs.extend(other.txs);
        self
    }

    /// Reports readiness to every waiter.
    pub fn notify(self) {
        for tx in self.txs {
            let _ = tx.send(());
        }
    }
}

/// Waiter half. Resolves to `true` once ready, or `false` when the notifier was dropped
/// without firing (the task exited before becoming ready).
#[derive(Debug)]
pub struct ReadyWait(oneshot::Receiver<()>);

impl Future for ReadyWait {
    type Output = bool;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx).map(|r| r.is_ok())
    }
}

//! # Signal adapter: host termination signals → one termination request.
//!
//! [`SignalAdapter`] wraps a task (usually a [`Group`](crate::Group)) and, for as long as
//! the wrapped task runs, listens to a [`SignalSource`]. The first delivered signal (or a
//! termination request on the adapter itself) is forwarded to the wrapped task once;
//! later signals are logged and ignored. The wrapped task's outcome is returned unchanged,
//! and the source is dropped with it.
//!
//! ## Signals
//! **Unix platforms:** `SIGINT`, `SIGTERM`.
//!
//! **Other platforms:** `Ctrl-C` via [`tokio::signal::ctrl_c`].

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    error::TaskError,
    task::{BoxTask, Ready, Task},
};

/// Externally delivered termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    Terminate,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Interrupt => f.write_str("interrupt"),
            Signal::Terminate => f.write_str("terminated"),
        }
    }
}

/// Stream of host signals.
#[async_trait]
pub trait SignalSource: Send + 'static {
    /// Next delivered signal, or `None` once the source can deliver no more.
    async fn recv(&mut self) -> Option<Signal>;
}

#[async_trait]
impl SignalSource for mpsc::Receiver<Signal> {
    async fn recv(&mut self) -> Option<Signal> {
        mpsc::Receiver::recv(self).await
    }
}

/// Process signal listeners, installed by [`OsSignals::subscribe`].
#[cfg(unix)]
pub struct OsSignals {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl OsSignals {
    /// Returns `Err` if signal registration fails.
    pub fn subscribe() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }
}

#[cfg(unix)]
#[async_trait]
impl SignalSource for OsSignals {
    async fn recv(&mut self) -> Option<Signal> {
        tokio::select! {
            s = self.sigint.recv() => s.map(|_| Signal::Interrupt),
            s = self.sigterm.recv() => s.map(|_| Signal::Terminate),
        }
    }
}

#[cfg(not(unix))]
pub struct OsSignals;

#[cfg(not(unix))]
impl OsSignals {
    pub fn subscribe() -> std::io::Result<Self> {
        Ok(Self)
    }
}

#[cfg(not(unix))]
#[async_trait]
impl SignalSource for OsSignals {
    async fn recv(&mut self) -> Option<Signal> {
        tokio::signal::ctrl_c().await.ok().map(|_| Signal::Interrupt)
    }
}

/// Wraps a task and forwards host signals to it as a termination request.
pub struct SignalAdapter<S> {
    inner: BoxTask,
    signals: S,
}

impl<S: SignalSource> SignalAdapter<S> {
    pub fn new(inner: impl Task, signals: S) -> Self {
        Self {
            inner: Box::new(inner),
            signals,
        }
    }
}

impl SignalAdapter<OsSignals> {
    /// Wraps `inner` with the process' own `SIGINT` / `SIGTERM` listeners.
    pub fn os(inner: impl Task) -> std::io::Result<Self> {
        Ok(Self::new(inner, OsSignals::subscribe()?))
    }
}

#[async_trait]
impl<S: SignalSource> Task for SignalAdapter<S> {
    async fn run(self: Box<Self>, ctx: CancellationToken, ready: Ready) -> Result<(), TaskError> {
        let SignalAdapter { inner, mut signals } = *self;

        let token = CancellationToken::new();
        let (inner_ready, mut inner_wait) = Ready::channel();
        let run = inner.run(token.clone(), inner_ready);
        tokio::pin!(run);

        let mut ready = Some(ready);
        let mut forwarded = false;
        let mut listening = true;

        loop {
            tokio::select! {
                biased;

                result = &mut run => {
                    debug!(target: "dockstage.core.signal", ok = result.is_ok(), "wrapped task exited; unsubscribing");
                    return result;
                }

                signal = signals.recv(), if listening => match signal {
                    Some(signal) if !forwarded => {
                        info!(target: "dockstage.core.signal", %signal, "forwarding termination request");
                        forwarded = true;
                        token.cancel();
                    }
                    Some(signal) => {
                        debug!(target: "dockstage.core.signal", %signal, "already shutting down; ignoring");
                    }
                    None => listening = false,
                },

                _ = ctx.cancelled(), if !forwarded => {
                    debug!(target: "dockstage.core.signal", "termination requested; forwarding");
                    forwarded = true;
                    token.cancel();
                }

                is_ready = &mut inner_wait, if ready.is_some() => {
                    if let Some(ready) = ready.take()
                        && is_ready
                    {
                        ready.notify();
                    }
                }
            }
        }
    }
}

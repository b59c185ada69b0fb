//! # Group supervisor: runs named members side by side as one task.
//!
//! ```text
//!   Group::run(ctx, ready)
//!     ├─► TaskHandle::spawn(member[i])        (one tokio task per member)
//!     ├─► watch(member[i])                    (ready, then exit, over one channel)
//!     │
//!     └─► loop (single coordination path) {
//!           member ready ──► count; all N ready ──► ready.notify()
//!           ctx cancelled ─┐
//!           first exit  ───┴─► broadcast termination to every member still running
//!                              (once; group readiness is abandoned)
//!           every exit ──► record MemberExit { name, phase, result }
//!         } until the last member exited
//!     └─► GroupOutcome ──► Ok(()) | Err(TaskError::Group(..))
//! ```
//!
//! ## Rules
//! - The group is ready once **every** member reported ready; an exit before that
//!   drops the group's notifier for good.
//! - The **first** exit (success or failure) or an external termination request triggers
//!   exactly one termination request per still-running member.
//! - The outcome is available only after **all** members exited and is a failure iff at
//!   least one member failed. A member that stopped because it was asked to reports its
//!   own failure; the group never reinterprets member errors.

use async_trait::async_trait;
use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    error::TaskError,
    handle::TaskHandle,
    task::{BoxTask, Ready, ReadyWait, Task},
};

mod outcome;
pub use outcome::{ExitPhase, FAILURE_DELIMITER, GroupOutcome, MemberExit};

/// A named task registered with a [`Group`].
///
/// The name is used for diagnostics and error attribution only.
pub struct Member {
    name: String,
    task: BoxTask,
}

impl Member {
    pub fn new(name: impl Into<String>, task: impl Task) -> Self {
        Self {
            name: name.into(),
            task: Box::new(task),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Parallel group of members.
#[derive(Default)]
pub struct Group {
    members: Vec<Member>,
}

impl Group {
    pub fn new(members: Vec<Member>) -> Self {
        Self { members }
    }

    pub fn with_member(mut self, name: impl Into<String>, task: impl Task) -> Self {
        self.members.push(Member::new(name, task));
        self
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Runs every member and returns once the last one exited.
    #[instrument(level = "debug", skip_all, fields(members = self.members.len()))]
    pub async fn supervise(self, ctx: CancellationToken, ready: Ready) -> GroupOutcome {
        let total = self.members.len();
        if total == 0 {
            ready.notify();
            return GroupOutcome::default();
        }

        let mut names = Vec::with_capacity(total);
        let mut tokens = Vec::with_capacity(total);
        let (events_tx, mut events) = mpsc::unbounded_channel();
        // aborted on drop, which drops the handles and cancels their members
        let mut watchers = JoinSet::new();

        for (index, member) in self.members.into_iter().enumerate() {
            let mut handle = TaskHandle::spawn(member.name.clone(), member.task);
            tokens.push(handle.termination());
            let wait = handle.take_ready();
            watchers.spawn(watch(index, handle, wait, events_tx.clone()));
            names.push(member.name);
        }
        drop(events_tx);
        info!(target: "dockstage.core.group", members = ?names, "group started");

        let mut group_ready = Some(ready);
        let mut ready_count = 0usize;
        let mut shutdown = false;
        let mut exited: Vec<Option<MemberExit>> = (0..total).map(|_| None).collect();

        loop {
            tokio::select! {
                biased;

                event = events.recv() => match event {
                    None => break,
                    // readiness reported after shutdown no longer counts
                    Some(Event::Ready(_)) if group_ready.is_none() => {}
                    Some(Event::Ready(index)) => {
                        ready_count += 1;
                        debug!(
                            target: "dockstage.core.group",
                            member = %names[index], ready_count, total, "member ready"
                        );
                        if ready_count == total
                            && let Some(ready) = group_ready.take()
                        {
                            info!(target: "dockstage.core.group", "all members ready");
                            ready.notify();
                        }
                    }
                    Some(Event::Exit(index, result)) => {
                        let phase = if shutdown {
                            ExitPhase::AfterShutdown
                        } else {
                            ExitPhase::BeforeShutdown
                        };
                        let name = &names[index];
                        match &result {
                            Ok(()) => {
                                info!(target: "dockstage.core.group", member = %name, ?phase, "member exited")
                            }
                            Err(e) => warn!(
                                target: "dockstage.core.group",
                                member = %name, ?phase, error = %e, label = e.as_label(),
                                "member exited with error"
                            ),
                        }
                        exited[index] = Some(MemberExit { name: name.clone(), phase, result });
                        if !shutdown {
                            shutdown = true;
                            group_ready = None;
                            broadcast(&names, &tokens, &exited);
                        }
                    }
                },

                _ = ctx.cancelled(), if !shutdown => {
                    info!(target: "dockstage.core.group", "termination requested; stopping members");
                    shutdown = true;
                    group_ready = None;
                    broadcast(&names, &tokens, &exited);
                }
            }
        }

        let exits = exited
            .into_iter()
            .zip(names)
            .map(|(exit, name)| {
                exit.unwrap_or_else(|| MemberExit {
                    name,
                    phase: ExitPhase::AfterShutdown,
                    result: Err(TaskError::Panicked {
                        reason: "member supervision task lost".into(),
                    }),
                })
            })
            .collect();
        GroupOutcome::new(exits)
    }
}

/// What a member watcher reports to the group loop.
enum Event {
    Ready(usize),
    Exit(usize, Result<(), TaskError>),
}

/// Forwards one member's readiness and exit, readiness always first.
async fn watch(
    index: usize,
    handle: TaskHandle,
    wait: Option<ReadyWait>,
    events: mpsc::UnboundedSender<Event>,
) {
    let exit = handle.wait();
    tokio::pin!(exit);

    let result = match wait {
        Some(mut wait) => {
            let early = tokio::select! {
                ready = &mut wait => {
                    if ready {
                        let _ = events.send(Event::Ready(index));
                    }
                    None
                }
                result = &mut exit => Some(result),
            };
            match early {
                Some(result) => {
                    // the notifier went away with the task, so this resolves at once
                    if wait.await {
                        let _ = events.send(Event::Ready(index));
                    }
                    result
                }
                None => exit.await,
            }
        }
        None => exit.await,
    };
    let _ = events.send(Event::Exit(index, result));
}

/// Sends one termination request to every member that has not exited yet.
fn broadcast(names: &[String], tokens: &[CancellationToken], exited: &[Option<MemberExit>]) {
    for ((name, token), exit) in names.iter().zip(tokens).zip(exited) {
        if exit.is_none() {
            debug!(target: "dockstage.core.group", member = %name, "sending termination request");
            token.cancel();
        }
    }
}

#[async_trait]
impl Task for Group {
    async fn run(self: Box<Self>, ctx: CancellationToken, ready: Ready) -> Result<(), TaskError> {
        self.supervise(ctx, ready).await.into_result()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;
    use crate::task::TaskFn;

    /// Ready immediately, interrupted on request.
    fn idle() -> BoxTask {
        TaskFn::boxed(|ctx: CancellationToken, ready: Ready| async move {
            ready.notify();
            ctx.cancelled().await;
            Err(TaskError::Interrupted)
        })
    }

    /// Ready once `go` fires, interrupted on request.
    fn gated(go: oneshot::Receiver<()>) -> BoxTask {
        TaskFn::boxed(|ctx: CancellationToken, ready: Ready| async move {
            tokio::select! {
                _ = go => ready.notify(),
                _ = ctx.cancelled() => return Err(TaskError::Interrupted),
            }
            ctx.cancelled().await;
            Err(TaskError::Interrupted)
        })
    }

    /// Stops cleanly when asked.
    fn graceful() -> BoxTask {
        TaskFn::boxed(|ctx: CancellationToken, ready: Ready| async move {
            ready.notify();
            ctx.cancelled().await;
            Ok(())
        })
    }

    async fn not_within(wait: &mut crate::ReadyWait, ms: u64) -> bool {
        tokio::time::timeout(Duration::from_millis(ms), wait)
            .await
            .is_err()
    }

    #[tokio::test]
    async fn ready_only_after_every_member() {
        let (go_a, rx_a) = oneshot::channel();
        let (go_b, rx_b) = oneshot::channel();
        let (go_c, rx_c) = oneshot::channel();
        let group = Group::default()
            .with_member("a", gated(rx_a))
            .with_member("b", gated(rx_b))
            .with_member("c", gated(rx_c));

        let mut handle = TaskHandle::spawn("group", Box::new(group));
        let mut wait = handle.take_ready().unwrap();

        go_a.send(()).unwrap();
        go_b.send(()).unwrap();
        assert!(not_within(&mut wait, 50).await, "ready before the last member");

        go_c.send(()).unwrap();
        assert!(wait.await);

        handle.signal();
        let err = handle.wait().await.unwrap_err();
        let TaskError::Group(outcome) = err else {
            panic!("expected group error")
        };
        assert_eq!(outcome.failures().count(), 3);
    }

    #[tokio::test]
    async fn first_exit_stops_the_rest() {
        let group = Group::default()
            .with_member("quick", TaskFn::new(|_ctx: CancellationToken, _ready: Ready| async move {
                Ok(())
            }))
            .with_member("slow", idle())
            .with_member("slower", idle());

        let outcome = group
            .supervise(CancellationToken::new(), Ready::noop())
            .await;

        let quick = outcome.get("quick").unwrap();
        assert_eq!(quick.phase, ExitPhase::BeforeShutdown);
        assert!(quick.result.is_ok());
        for name in ["slow", "slower"] {
            let exit = outcome.get(name).unwrap();
            assert_eq!(exit.phase, ExitPhase::AfterShutdown);
            assert!(matches!(exit.result, Err(TaskError::Interrupted)));
        }
        assert_eq!(
            outcome.to_string(),
            "slow exited with error: interrupted; slower exited with error: interrupted"
        );
    }

    #[tokio::test]
    async fn exit_before_all_ready_abandons_group_readiness() {
        let (_go, never) = oneshot::channel();
        let group = Group::default()
            .with_member("waiting", gated(never))
            .with_member(
                "broken",
                TaskFn::new(|_ctx: CancellationToken, ready: Ready| async move {
                    ready.notify();
                    Err(TaskError::ChildProcess {
                        reason: "exit code: 1".into(),
                    })
                }),
            );

        let mut handle = TaskHandle::spawn("group", Box::new(group));
        assert!(!handle.ready().await);

        let err = handle.wait().await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("broken exited with error: child process failed: exit code: 1"));
        assert!(msg.contains("waiting exited with error: interrupted"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn member_ready_then_done_still_readies_the_group() {
        for _ in 0..200 {
            let group = Group::default().with_member(
                "oneshot",
                TaskFn::new(|_ctx: CancellationToken, ready: Ready| async move {
                    ready.notify();
                    Ok(())
                }),
            );
            let (ready, wait) = Ready::channel();

            let outcome = group.supervise(CancellationToken::new(), ready).await;
            assert!(outcome.is_success());
            assert!(wait.await, "every member signalled ready");
        }
    }

    #[tokio::test]
    async fn success_requires_every_member_to_succeed() {
        let group = Group::default()
            .with_member("done", TaskFn::new(|_ctx: CancellationToken, _ready: Ready| async move {
                Ok(())
            }))
            .with_member("graceful", graceful());
        assert!(group
            .supervise(CancellationToken::new(), Ready::noop())
            .await
            .is_success());
    }

    #[tokio::test]
    async fn external_termination_interrupts_every_member() {
        let group = Group::default()
            .with_member("builder", idle())
            .with_member("docker_daemon", idle());

        let handle = TaskHandle::invoke("group", Box::new(group)).await;
        handle.signal();
        handle.signal();

        let err = handle.wait().await.unwrap_err();
        let TaskError::Group(outcome) = err else {
            panic!("expected group error")
        };
        assert!(outcome
            .exits()
            .iter()
            .all(|e| e.phase == ExitPhase::AfterShutdown && matches!(e.result, Err(TaskError::Interrupted))));
        let msg = outcome.to_string();
        assert!(msg.contains("builder exited with error: interrupted"));
        assert!(msg.contains("docker_daemon exited with error: interrupted"));
    }

    #[tokio::test]
    async fn empty_group_is_ready_and_successful() {
        let (ready, wait) = Ready::channel();
        let outcome = Group::default()
            .supervise(CancellationToken::new(), ready)
            .await;
        assert!(wait.await);
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn panicking_member_is_attributed() {
        let group = Group::default()
            .with_member("panicky", TaskFn::new(|_ctx: CancellationToken, _ready: Ready| async move {
                panic!("boom")
            }))
            .with_member("graceful", graceful());

        let outcome = group
            .supervise(CancellationToken::new(), Ready::noop())
            .await;
        assert!(matches!(
            outcome.get("panicky").unwrap().result,
            Err(TaskError::Panicked { .. })
        ));
        assert!(outcome.get("graceful").unwrap().result.is_ok());
    }
}

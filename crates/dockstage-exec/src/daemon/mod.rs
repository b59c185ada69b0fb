//! # Daemon task: runs the container daemon as a supervised child process.
//!
//! The task spawns the daemon executable, polls its API socket until a connection succeeds
//! and then reports ready. An endpoint that already accepts connections before the spawn
//! belongs to someone else, so the task refuses to start. It finishes when
//! - a termination request arrives: the daemon gets `SIGTERM`, then a kill after the grace
//!   period, and the task reports success;
//! - the daemon exits on its own: the task reports [`TaskError::ChildProcess`], even on a
//!   zero exit code, because nobody asked it to stop.

use std::{path::PathBuf, process::Stdio, time::Duration};

use async_trait::async_trait;
use dockstage_core::{Ready, Task, TaskError};
use dockstage_model::RegistryAddress;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    error::ExecError,
    util::{Stopped, cmd_program, stop_graceful, unexpected_exit},
};

mod endpoint;
pub use endpoint::DaemonEndpoint;

/// How the daemon is launched and watched.
#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub program: PathBuf,
    /// Leading arguments, before registry and host flags.
    pub base_args: Vec<String>,
    pub insecure_registries: Vec<RegistryAddress>,
    pub endpoint: DaemonEndpoint,
    /// Appended after every generated flag.
    pub extra_args: Vec<String>,
    pub probe_interval: Duration,
    /// Time the daemon gets to exit after `SIGTERM` before it is killed.
    pub grace: Duration,
}

impl DaemonConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            base_args: vec!["daemon".to_string()],
            insecure_registries: Vec::new(),
            #[cfg(unix)]
            endpoint: DaemonEndpoint::default_socket(),
            #[cfg(not(unix))]
            endpoint: DaemonEndpoint::Tcp("127.0.0.1:2375".to_string()),
            extra_args: Vec::new(),
            probe_interval: Duration::from_millis(100),
            grace: Duration::from_secs(10),
        }
    }

    pub fn with_insecure_registries(mut self, registries: Vec<RegistryAddress>) -> Self {
        self.insecure_registries = registries;
        self
    }

    pub fn with_endpoint(mut self, endpoint: DaemonEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_base_args(mut self, args: Vec<String>) -> Self {
        self.base_args = args;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Full argument list passed to the daemon executable.
    pub fn args(&self) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.extend(
            self.insecure_registries
                .iter()
                .map(|r| format!("--insecure-registry={r}")),
        );
        args.push("-H".to_string());
        args.push(self.endpoint.host_arg());
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// Supervised daemon process. Ready once its endpoint accepts connections.
pub struct DaemonTask {
    cfg: DaemonConfig,
}

impl DaemonTask {
    pub fn new(cfg: DaemonConfig) -> Self {
        Self { cfg }
    }
}

/// One connection attempt, bounded by the probe interval.
async fn probe(cfg: &DaemonConfig) -> bool {
    matches!(
        tokio::time::timeout(cfg.probe_interval, cfg.endpoint.accepts()).await,
        Ok(true)
    )
}

#[async_trait]
impl Task for DaemonTask {
    #[instrument(level = "debug", name = "docker_daemon", skip_all)]
    async fn run(self: Box<Self>, ctx: CancellationToken, ready: Ready) -> Result<(), TaskError> {
        let cfg = self.cfg;
        if cfg.program.as_os_str().is_empty() {
            return Err(ExecError::MissingProgram.into());
        }

        if probe(&cfg).await {
            warn!(target: "dockstage.exec.daemon", endpoint = %cfg.endpoint, "endpoint served before spawn");
            return Err(ExecError::EndpointInUse(cfg.endpoint.to_string()).into());
        }

        let args = cfg.args();
        let mut cmd = cmd_program(&cfg.program, &args);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecError::Spawn(format!("{}: {e}", cfg.program.display())))?;
        info!(target: "dockstage.exec.daemon", program = %cfg.program.display(), pid = ?child.id(), ?args, "daemon spawned");

        let mut ready = Some(ready);
        let mut ticks = tokio::time::interval(cfg.probe_interval);
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = ctx.cancelled() => {
                    debug!(target: "dockstage.exec.daemon", "termination requested; stopping daemon");
                    return match stop_graceful(&mut child, cfg.grace).await? {
                        Stopped::Graceful(status) => {
                            info!(target: "dockstage.exec.daemon", %status, "daemon stopped");
                            Ok(())
                        }
                        Stopped::Forced => {
                            warn!(target: "dockstage.exec.daemon", "daemon killed after grace period");
                            Ok(())
                        }
                    };
                }

                status = child.wait() => {
                    let status = status.map_err(ExecError::from)?;
                    let err = unexpected_exit(status);
                    warn!(target: "dockstage.exec.daemon", %status, error = %err, "daemon exited on its own");
                    return Err(err.into());
                }

                _ = ticks.tick(), if ready.is_some() => {
                    if probe(&cfg).await
                        && let Some(ready) = ready.take()
                    {
                        info!(target: "dockstage.exec.daemon", endpoint = %cfg.endpoint, "daemon is accepting connections");
                        ready.notify();
                    }
                }
            }
        }
    }
}

use std::{path::Path, process::ExitStatus, time::Duration};

use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{ExecError, ExecResult};

/// How a stop request ended.
#[derive(Debug)]
pub enum Stopped {
    /// The child exited within the grace period.
    Graceful(ExitStatus),
    /// The child ignored the request and was killed.
    Forced,
}

pub fn cmd_program(program: &Path, args: &[String]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args.iter().map(|s| s.as_str()));
    cmd
}

/// Sends `SIGTERM`, waits up to `grace` for the child to exit, then kills it.
pub async fn stop_graceful(child: &mut Child, grace: Duration) -> ExecResult<Stopped> {
    request_stop(child);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => Ok(Stopped::Graceful(status?)),
        Err(_) => {
            warn!(target: "dockstage.exec.util", ?grace, "grace period exceeded; killing child");
            child.kill().await?;
            Ok(Stopped::Forced)
        }
    }
}

#[cfg(unix)]
fn request_stop(child: &Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    if let Some(id) = child.id() {
        debug!(target: "dockstage.exec.util", pid = id, "sending SIGTERM");
        if let Err(e) = kill(Pid::from_raw(id as i32), Signal::SIGTERM) {
            debug!(target: "dockstage.exec.util", pid = id, error = %e, "SIGTERM failed");
        }
    }
}

#[cfg(not(unix))]
fn request_stop(_child: &Child) {
    debug!(target: "dockstage.exec.util", "no graceful stop on this platform");
}

/// Describes an exit the supervisor did not ask for.
pub fn unexpected_exit(status: ExitStatus) -> ExecError {
    if let Some(code) = status.code() {
        return match code {
            0 => ExecError::UnexpectedExit,
            code => ExecError::NonZeroExit { code },
        };
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        ExecError::KilledBySignal {
            signal: status.signal().unwrap_or_default(),
        }
    }
    #[cfg(not(unix))]
    {
        ExecError::KilledBySignal { signal: 0 }
    }
}

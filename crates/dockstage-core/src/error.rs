//! Outcome taxonomy shared by every task.
//!
//! Tasks resolve their internal failures into exactly one [`TaskError`] kind; the group
//! supervisor only aggregates and attributes them.

use std::time::Duration;

use thiserror::Error;

use crate::supervisor::GroupOutcome;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TaskError {
    /// The image locator could not be parsed.
    #[error("{reason}")]
    InvalidReference { reason: String },

    /// The daemon did not become usable within the configured timeout.
    #[error("timed out waiting for daemon to start after {elapsed:?}")]
    DaemonStartTimeout { elapsed: Duration },

    /// The task was asked to stop before it finished.
    #[error("interrupted")]
    Interrupted,

    /// A supervised child process failed on its own.
    #[error("child process failed: {reason}")]
    ChildProcess { reason: String },

    /// The staging result could not be persisted.
    #[error("failed to write staging result: {reason}")]
    ResultWrite { reason: String },

    /// An external registry operation failed.
    #[error("registry operation failed: {reason}")]
    Registry { reason: String },

    /// The task panicked or its runtime task was lost.
    #[error("task panicked: {reason}")]
    Panicked { reason: String },

    /// One or more members of a group failed.
    #[error("{0}")]
    Group(GroupOutcome),
}

impl TaskError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::InvalidReference { .. } => "invalid_reference",
            TaskError::DaemonStartTimeout { .. } => "daemon_start_timeout",
            TaskError::Interrupted => "interrupted",
            TaskError::ChildProcess { .. } => "child_process",
            TaskError::ResultWrite { .. } => "result_write",
            TaskError::Registry { .. } => "registry",
            TaskError::Panicked { .. } => "panicked",
            TaskError::Group(_) => "group",
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, TaskError::Interrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_the_daemon() {
        let err = TaskError::DaemonStartTimeout {
            elapsed: Duration::from_millis(300),
        };
        assert_eq!(
            err.to_string(),
            "timed out waiting for daemon to start after 300ms"
        );
        assert_eq!(err.as_label(), "daemon_start_timeout");
    }

    #[test]
    fn interrupted_is_labelled() {
        assert!(TaskError::Interrupted.is_interrupted());
        assert_eq!(TaskError::Interrupted.as_label(), "interrupted");
    }
}

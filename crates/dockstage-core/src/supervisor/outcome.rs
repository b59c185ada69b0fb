use std::fmt;

use crate::error::TaskError;

/// Separator between member failures in an aggregated message.
pub const FAILURE_DELIMITER: &str = "; ";

/// When a member exited relative to the group's shutdown broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPhase {
    /// The member exited on its own and triggered the shutdown.
    BeforeShutdown,
    /// The member exited after termination had been requested.
    AfterShutdown,
}

/// Recorded exit of one member.
#[derive(Debug)]
pub struct MemberExit {
    pub name: String,
    pub phase: ExitPhase,
    pub result: Result<(), TaskError>,
}

impl MemberExit {
    pub fn is_failure(&self) -> bool {
        self.result.is_err()
    }
}

/// Aggregated outcome of a group, in member registration order.
///
/// Built once the last member has exited; never mutated afterwards.
#[derive(Debug, Default)]
pub struct GroupOutcome {
    exits: Vec<MemberExit>,
}

impl GroupOutcome {
    pub(crate) fn new(exits: Vec<MemberExit>) -> Self {
        Self { exits }
    }

    pub fn exits(&self) -> &[MemberExit] {
        &self.exits
    }

    pub fn get(&self, name: &str) -> Option<&MemberExit> {
        self.exits.iter().find(|e| e.name == name)
    }

    pub fn failures(&self) -> impl Iterator<Item = &MemberExit> {
        self.exits.iter().filter(|e| e.is_failure())
    }

    /// `true` iff every member exited successfully.
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn into_result(self) -> Result<(), TaskError> {
        if self.is_success() {
            Ok(())
        } else {
            Err(TaskError::Group(self))
        }
    }
}

impl fmt::Display for GroupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, exit) in self.failures().enumerate() {
            if i > 0 {
                f.write_str(FAILURE_DELIMITER)?;
            }
            if let Err(e) = &exit.result {
                write!(f, "{} exited with error: {e}", exit.name)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exit(name: &str, result: Result<(), TaskError>) -> MemberExit {
        MemberExit {
            name: name.into(),
            phase: ExitPhase::AfterShutdown,
            result,
        }
    }

    #[test]
    fn message_attributes_every_failure() {
        let outcome = GroupOutcome::new(vec![
            exit("builder", Err(TaskError::Interrupted)),
            exit("cleaner", Ok(())),
            exit(
                "docker_daemon",
                Err(TaskError::ChildProcess {
                    reason: "exit code: 1".into(),
                }),
            ),
        ]);

        assert!(!outcome.is_success());
        assert_eq!(
            outcome.to_string(),
            "builder exited with error: interrupted; \
             docker_daemon exited with error: child process failed: exit code: 1"
        );
    }

    #[test]
    fn all_successful_members_make_a_successful_group() {
        let outcome = GroupOutcome::new(vec![exit("a", Ok(())), exit("b", Ok(()))]);
        assert!(outcome.is_success());
        assert!(outcome.into_result().is_ok());
    }
}

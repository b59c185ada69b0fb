use dockstage_core::TaskError;
use thiserror::Error;

pub type ExecResult<T> = Result<T, ExecError>;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("non-zero exit code: {code}")]
    NonZeroExit { code: i32 },
    #[error("exited unexpectedly with code 0")]
    UnexpectedExit,
    #[error("killed by signal {signal}")]
    KilledBySignal { signal: i32 },
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("endpoint already in use: {0}")]
    EndpointInUse(String),
    #[error("missing program")]
    MissingProgram,
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}

impl From<ExecError> for TaskError {
    fn from(e: ExecError) -> Self {
        TaskError::ChildProcess {
            reason: e.to_string(),
        }
    }
}

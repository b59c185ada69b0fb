mod error;
pub use error::{ExecError, ExecResult};

mod util;

pub mod daemon;
pub use daemon::{DaemonConfig, DaemonEndpoint, DaemonTask};

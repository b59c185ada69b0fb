//! Logging setup shared by every dockstage binary.
//!
//! Logs always go to stderr: stdout belongs to the staging
//! process messages that callers parse.

mod logger;
pub use logger::*;

use std::{ffi::OsString, process::ExitCode};

use clap::{Parser, error::ErrorKind};
use dockstage_builder::{ConfigError, StagingConfig};
use dockstage_core::TaskError;

use crate::args::Args;

/// How the process ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success,
    /// Bad arguments or configuration; nothing was started.
    Config,
    /// The staging group reported a failure.
    Staging,
}

impl Exit {
    pub fn code(self) -> u8 {
        match self {
            Exit::Success => 0,
            Exit::Config => 1,
            Exit::Staging => 2,
        }
    }

    pub fn from_outcome(outcome: &Result<(), TaskError>) -> Self {
        match outcome {
            Ok(()) => Exit::Success,
            Err(_) => Exit::Staging,
        }
    }
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit.code())
    }
}

/// Why the process stops before staging starts.
#[derive(Debug)]
pub enum Stop {
    Usage(clap::Error),
    Config(ConfigError),
}

impl Stop {
    pub fn exit(&self) -> Exit {
        match self {
            Stop::Usage(e)
                if matches!(
                    e.kind(),
                    ErrorKind::DisplayHelp
                        | ErrorKind::DisplayVersion
                        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) =>
            {
                Exit::Success
            }
            Stop::Usage(_) | Stop::Config(_) => Exit::Config,
        }
    }

    /// Prints the message clap rendered, or the configuration error.
    pub fn report(&self) {
        match self {
            Stop::Usage(e) => {
                let _ = e.print();
            }
            Stop::Config(e) => eprintln!("{e}"),
        }
    }
}

/// Parses and validates the command line.
pub fn configure<I, T>(argv: I) -> Result<(Args, StagingConfig), Stop>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = Args::try_parse_from(argv).map_err(Stop::Usage)?;
    let cfg = args.staging_flags().validate().map_err(Stop::Config)?;
    Ok((args, cfg))
}

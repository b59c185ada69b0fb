use std::{process::ExitCode, sync::Arc};

use anyhow::Context;
use tracing::{error, info};

use dockstage_builder::RemoteRegistry;
use dockstage_core::{SignalAdapter, TaskHandle};
use dockstage_observe::{LoggerConfig, logger_init};

mod args;
mod exit;
mod staging;

use args::Args;
use exit::Exit;

#[tokio::main]
async fn main() -> ExitCode {
    // 1) Configuration: nothing runs on invalid input
    let (args, cfg) = match exit::configure(std::env::args_os()) {
        Ok((args, cfg)) => (args, Arc::new(cfg)),
        Err(stop) => {
            stop.report();
            return stop.exit().into();
        }
    };
    if let Err(e) = init_logger(&args) {
        eprintln!("{e:#}");
        return Exit::Config.into();
    }
    info!(locator = %cfg.locator, caching = cfg.caching(), "configuration loaded");

    // 2) Group: builder (+ daemon when caching), wrapped with host signals
    let registry = Arc::new(RemoteRegistry::new(
        cfg.insecure_registries.clone(),
        &cfg.daemon_program,
    ));
    let group = staging::staging_group(Arc::clone(&cfg), registry);
    let staging = match SignalAdapter::os(group) {
        Ok(staging) => staging,
        Err(e) => {
            eprintln!("failed to subscribe to signals: {e}");
            return Exit::Staging.into();
        }
    };

    // 3) Run and map the outcome
    let handle = TaskHandle::invoke("staging", Box::new(staging)).await;
    println!("Staging process started ...");

    let outcome = handle.wait().await;
    match &outcome {
        Ok(()) => {
            info!("staging finished");
            println!("Staging process finished");
        }
        Err(e) => {
            error!(error = %e, label = e.as_label(), "staging failed");
            eprintln!("Staging process failed: {e}");
        }
    }
    Exit::from_outcome(&outcome).into()
}

fn init_logger(args: &Args) -> anyhow::Result<()> {
    let cfg = LoggerConfig::from_flags(&args.log_level, &args.log_format)
        .context("invalid logging flags")?;
    logger_init(&cfg).context("failed to initialize logger")?;
    Ok(())
}

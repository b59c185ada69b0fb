use std::sync::Arc;

use dockstage_builder::{BuilderTask, Registry, StagingConfig};
use dockstage_core::{Group, observe};
use dockstage_exec::{DaemonConfig, DaemonTask};

pub const BUILDER: &str = "builder";
pub const DOCKER_DAEMON: &str = "docker_daemon";

/// Builder alone, or builder plus the daemon it caches through.
pub fn staging_group(cfg: Arc<StagingConfig>, registry: Arc<dyn Registry>) -> Group {
    let builder = BuilderTask::new(Arc::clone(&cfg), registry);
    if !cfg.caching() {
        return Group::default().with_member(BUILDER, builder);
    }

    let daemon = DaemonConfig::new(&cfg.daemon_program)
        .with_insecure_registries(cfg.insecure_registries.clone());
    let (daemon, daemon_ready) = observe(DaemonTask::new(daemon));

    Group::default()
        .with_member(BUILDER, builder.with_daemon_ready(daemon_ready))
        .with_member(DOCKER_DAEMON, daemon)
}

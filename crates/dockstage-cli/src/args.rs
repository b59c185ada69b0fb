use std::path::PathBuf;

use clap::Parser;
use dockstage_builder::{
    DEFAULT_DAEMON_PATH, DEFAULT_DAEMON_TIMEOUT_MS, DEFAULT_OUTPUT_PATH, StagingFlags,
};
use dockstage_model::TimeoutMs;

/// Stages a container image for a downstream runtime.
#[derive(Debug, Parser)]
#[command(name = "dockstage", version)]
pub struct Args {
    /// Image in `docker://[registry/][scope/]repository[#tag]` form
    #[arg(long)]
    pub docker_image_url: Option<String>,

    /// Image in `[registry/][scope/]repository[:tag]` form
    #[arg(long)]
    pub docker_ref: Option<String>,

    /// File that receives the staging result
    #[arg(long, default_value = DEFAULT_OUTPUT_PATH)]
    pub output_metadata_json_filename: PathBuf,

    /// Registries to cache into, comma separated `host:port`
    #[arg(long)]
    pub docker_registry_addresses: Option<String>,

    /// Registries reached over plain http, comma separated `host:port`
    #[arg(long)]
    pub insecure_docker_registries: Option<String>,

    #[arg(long, default_value = DEFAULT_DAEMON_PATH)]
    pub docker_daemon_executable_path: PathBuf,

    /// Cache the image into one of the registry addresses
    #[arg(long)]
    pub cache_docker_image: bool,

    #[arg(long)]
    pub docker_login_server: Option<String>,

    #[arg(long)]
    pub docker_registry_auth_token: Option<String>,

    #[arg(long)]
    pub docker_registry_email: Option<String>,

    /// How long to wait for the daemon to accept connections
    #[arg(long, default_value_t = DEFAULT_DAEMON_TIMEOUT_MS)]
    pub docker_daemon_timeout_ms: TimeoutMs,

    /// Credentials file written before pushing (defaults to `$HOME/.dockercfg`)
    #[arg(long)]
    pub dockercfg_path: Option<PathBuf>,

    /// Log filter directive
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// text, json or journald
    #[arg(long, default_value = "text")]
    pub log_format: String,
}

impl Args {
    pub fn staging_flags(&self) -> StagingFlags {
        StagingFlags {
            docker_image_url: self.docker_image_url.clone(),
            docker_ref: self.docker_ref.clone(),
            output_path: self.output_metadata_json_filename.clone(),
            docker_registry_addresses: self.docker_registry_addresses.clone(),
            insecure_docker_registries: self.insecure_docker_registries.clone(),
            daemon_program: self.docker_daemon_executable_path.clone(),
            cache_docker_image: self.cache_docker_image,
            docker_login_server: self.docker_login_server.clone(),
            docker_registry_auth_token: self.docker_registry_auth_token.clone(),
            docker_registry_email: self.docker_registry_email.clone(),
            daemon_timeout_ms: self.docker_daemon_timeout_ms,
            dockercfg_path: self.dockercfg_path.clone(),
        }
    }
}

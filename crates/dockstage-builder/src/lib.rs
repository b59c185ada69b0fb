//! Staging workflow: resolve an image, optionally cache it into a private registry and
//! write the execution metadata a downstream runtime needs.

mod config;
pub use config::{
    CacheConfig, ConfigError, Credentials, DEFAULT_DAEMON_PATH, DEFAULT_DAEMON_TIMEOUT_MS,
    DEFAULT_OUTPUT_PATH, ImageLocator, StagingConfig, StagingFlags,
};

mod registry;
pub use registry::{Registry, RegistryError, RemoteRegistry};

mod destination;
pub use destination::generate_destination;

mod dockercfg;
pub use dockercfg::{dockercfg_contents, write_dockercfg};

mod result;
pub use result::write_result;

mod task;
pub use task::{BuilderTask, Stage};

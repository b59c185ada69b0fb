use std::{fmt, path::PathBuf, time::Duration};

use dockstage_model::{ImageRef, ModelError, RegistryAddress, TimeoutMs};
use thiserror::Error;

pub const DEFAULT_OUTPUT_PATH: &str = "/tmp/result/result.json";
pub const DEFAULT_DAEMON_PATH: &str = "/tmp/docker_app_lifecycle/docker";
pub const DEFAULT_DAEMON_TIMEOUT_MS: TimeoutMs = 10_000;

const DOCKERCFG_NAME: &str = ".dockercfg";

/// Invalid command line; reported before any task starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing flag: docker-image-url or docker-ref required")]
    MissingLocator,
    #[error("invalid {flag}: {source}")]
    InvalidRegistries {
        flag: &'static str,
        #[source]
        source: ModelError,
    },
    #[error("missing flag: docker-registry-addresses required")]
    MissingRegistryAddresses,
    #[error(
        "missing flags: docker-login-server, docker-registry-auth-token and docker-registry-email required simultaneously"
    )]
    PartialCredentials,
    #[error("invalid docker-login-server [{0}]")]
    InvalidLoginServer(String),
    #[error("invalid docker-registry-email [{0}]")]
    InvalidEmail(String),
    #[error("docker daemon not found in {0}")]
    DaemonNotFound(PathBuf),
    #[error("docker-daemon-timeout-ms must be greater than zero")]
    InvalidTimeout,
    #[error("cannot locate home directory for {DOCKERCFG_NAME}")]
    NoHomeDirectory,
}

/// Image locator as given on the command line; parsed by the builder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageLocator {
    /// `docker://[registry/][scope/]repository[#tag]`
    Url(String),
    /// `[registry/][scope/]repository[:tag]`
    Ref(String),
}

impl ImageLocator {
    pub fn resolve(&self) -> Result<ImageRef, ModelError> {
        match self {
            ImageLocator::Url(url) => ImageRef::parse_url(url),
            ImageLocator::Ref(reference) => ImageRef::parse_ref(reference),
        }
    }
}

impl fmt::Display for ImageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageLocator::Url(s) | ImageLocator::Ref(s) => f.write_str(s),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub server: String,
    pub token: String,
    pub email: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("server", &self.server)
            .field("token", &"<redacted>")
            .field("email", &self.email)
            .finish()
    }
}

/// Present only when caching was requested.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Destination pool, never empty.
    pub registries: Vec<RegistryAddress>,
    pub credentials: Option<Credentials>,
    /// Where [`Credentials`] are written before pushing.
    pub dockercfg_path: PathBuf,
}

/// Validated, immutable staging configuration.
#[derive(Clone, Debug)]
pub struct StagingConfig {
    pub locator: ImageLocator,
    pub output_path: PathBuf,
    pub insecure_registries: Vec<RegistryAddress>,
    pub daemon_program: PathBuf,
    pub daemon_timeout: Duration,
    pub cache: Option<CacheConfig>,
}

impl StagingConfig {
    pub fn caching(&self) -> bool {
        self.cache.is_some()
    }
}

/// Raw flag values, before validation.
#[derive(Clone, Debug)]
pub struct StagingFlags {
    pub docker_image_url: Option<String>,
    pub docker_ref: Option<String>,
    pub output_path: PathBuf,
    pub docker_registry_addresses: Option<String>,
    pub insecure_docker_registries: Option<String>,
    pub daemon_program: PathBuf,
    pub cache_docker_image: bool,
    pub docker_login_server: Option<String>,
    pub docker_registry_auth_token: Option<String>,
    pub docker_registry_email: Option<String>,
    pub daemon_timeout_ms: TimeoutMs,
    /// Overrides `$HOME/.dockercfg`.
    pub dockercfg_path: Option<PathBuf>,
}

impl Default for StagingFlags {
    fn default() -> Self {
        Self {
            docker_image_url: None,
            docker_ref: None,
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            docker_registry_addresses: None,
            insecure_docker_registries: None,
            daemon_program: PathBuf::from(DEFAULT_DAEMON_PATH),
            cache_docker_image: false,
            docker_login_server: None,
            docker_registry_auth_token: None,
            docker_registry_email: None,
            daemon_timeout_ms: DEFAULT_DAEMON_TIMEOUT_MS,
            dockercfg_path: None,
        }
    }
}

impl StagingFlags {
    pub fn validate(self) -> Result<StagingConfig, ConfigError> {
        let locator = match (non_empty(self.docker_image_url), non_empty(self.docker_ref)) {
            (Some(url), _) => ImageLocator::Url(url),
            (None, Some(reference)) => ImageLocator::Ref(reference),
            (None, None) => return Err(ConfigError::MissingLocator),
        };

        let registries = parse_registries("docker-registry-addresses", self.docker_registry_addresses)?;
        let insecure_registries =
            parse_registries("insecure-docker-registries", self.insecure_docker_registries)?;

        if self.daemon_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        let credentials = validate_credentials(
            self.docker_login_server,
            self.docker_registry_auth_token,
            self.docker_registry_email,
        )?;

        let cache = if self.cache_docker_image {
            if registries.is_empty() {
                return Err(ConfigError::MissingRegistryAddresses);
            }
            if !self.daemon_program.exists() {
                return Err(ConfigError::DaemonNotFound(self.daemon_program));
            }
            let dockercfg_path = match self.dockercfg_path {
                Some(path) => path,
                None => dirs::home_dir()
                    .ok_or(ConfigError::NoHomeDirectory)?
                    .join(DOCKERCFG_NAME),
            };
            Some(CacheConfig {
                registries,
                credentials,
                dockercfg_path,
            })
        } else {
            None
        };

        Ok(StagingConfig {
            locator,
            output_path: self.output_path,
            insecure_registries,
            daemon_program: self.daemon_program,
            daemon_timeout: Duration::from_millis(self.daemon_timeout_ms),
            cache,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_registries(
    flag: &'static str,
    value: Option<String>,
) -> Result<Vec<RegistryAddress>, ConfigError> {
    match non_empty(value) {
        Some(list) => RegistryAddress::parse_list(&list)
            .map_err(|source| ConfigError::InvalidRegistries { flag, source }),
        None => Ok(Vec::new()),
    }
}

fn validate_credentials(
    server: Option<String>,
    token: Option<String>,
    email: Option<String>,
) -> Result<Option<Credentials>, ConfigError> {
    match (non_empty(server), non_empty(token), non_empty(email)) {
        (None, None, None) => Ok(None),
        (Some(server), Some(token), Some(email)) => {
            if server.chars().any(char::is_whitespace) {
                return Err(ConfigError::InvalidLoginServer(server));
            }
            if !(email.contains('@') && email.contains('.')) {
                return Err(ConfigError::InvalidEmail(email));
            }
            Ok(Some(Credentials {
                server,
                token,
                email,
            }))
        }
        _ => Err(ConfigError::PartialCredentials),
    }
}

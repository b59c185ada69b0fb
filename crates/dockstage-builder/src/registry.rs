//! # Registry collaborator.
//!
//! [`Registry`] is the boundary between the staging workflow and everything that talks to a
//! registry. Both operations are single calls with a success/failure outcome; nothing here
//! retries.
//!
//! [`RemoteRegistry`] reads metadata over the registry HTTP v2 API and caches images through
//! the daemon's command line client (`pull`, `tag`, `push`).

use std::{collections::BTreeMap, path::PathBuf, process::Stdio};

use async_trait::async_trait;
use dockstage_core::TaskError;
use dockstage_model::{ExecutionMetadata, ExposedPort, ImageRef, RegistryAddress};
use reqwest::{StatusCode, header};
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, instrument};

const HUB_REGISTRY: &str = "docker.io";
const HUB_API_HOST: &str = "registry-1.docker.io";

const MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
const MANIFEST_LIST_V2: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

const TARGET_OS: &str = "linux";
const TARGET_ARCH: &str = "amd64";

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned {status}")]
    Status { url: String, status: u16 },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("no {TARGET_OS}/{TARGET_ARCH} manifest for {0}")]
    NoPlatform(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("docker {step} failed: {reason}")]
    Command { step: &'static str, reason: String },
}

impl From<RegistryError> for TaskError {
    fn from(e: RegistryError) -> Self {
        TaskError::Registry {
            reason: e.to_string(),
        }
    }
}

/// External registry operations used by the builder.
#[async_trait]
pub trait Registry: Send + Sync + 'static {
    /// Resolves `image` to the metadata a runtime needs to start it.
    async fn fetch_metadata(&self, image: &ImageRef) -> Result<ExecutionMetadata, RegistryError>;

    /// Copies `source` to `destination` through the local daemon.
    async fn cache(&self, source: &ImageRef, destination: &ImageRef) -> Result<(), RegistryError>;
}

/// Registry access over HTTP plus the daemon CLI.
pub struct RemoteRegistry {
    client: reqwest::Client,
    insecure: Vec<RegistryAddress>,
    docker: PathBuf,
}

impl RemoteRegistry {
    pub fn new(insecure: Vec<RegistryAddress>, docker: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            insecure,
            docker: docker.into(),
        }
    }

    fn base_url(&self, registry: &str) -> String {
        let host = if registry == HUB_REGISTRY {
            HUB_API_HOST
        } else {
            registry
        };
        let scheme = if self.insecure.iter().any(|r| r.as_str() == registry) {
            "http"
        } else {
            "https"
        };
        format!("{scheme}://{host}")
    }

    /// GET with one anonymous bearer-token retry on `401`.
    async fn get(
        &self,
        url: &str,
        accept: &str,
        token: &mut Option<String>,
    ) -> Result<reqwest::Response, RegistryError> {
        let send = |token: Option<&str>| {
            let mut req = self.client.get(url).header(header::ACCEPT, accept);
            if let Some(token) = token {
                req = req.bearer_auth(token);
            }
            req.send()
        };

        let mut resp = send(token.as_deref()).await?;
        if resp.status() == StatusCode::UNAUTHORIZED && token.is_none() {
            let challenge = resp
                .headers()
                .get(header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| RegistryError::Auth(format!("{url}: no challenge")))?;
            let fresh = self.anonymous_token(&challenge).await?;
            resp = send(Some(&fresh)).await?;
            *token = Some(fresh);
        }

        if !resp.status().is_success() {
            return Err(RegistryError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }
        Ok(resp)
    }

    async fn anonymous_token(&self, challenge: &str) -> Result<String, RegistryError> {
        let params = parse_challenge(challenge)
            .ok_or_else(|| RegistryError::Auth(format!("unsupported challenge [{challenge}]")))?;
        let realm = params
            .get("realm")
            .ok_or_else(|| RegistryError::Auth("challenge without realm".into()))?;
        let query: Vec<(&str, &str)> = ["service", "scope"]
            .into_iter()
            .filter_map(|k| params.get(k).map(|v| (k, v.as_str())))
            .collect();

        debug!(target: "dockstage.builder.registry", %realm, "requesting anonymous token");
        let url = reqwest::Url::parse_with_params(realm, &query)
            .map_err(|e| RegistryError::Auth(format!("invalid realm [{realm}]: {e}")))?;
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(RegistryError::Auth(format!("{realm} returned {}", resp.status())));
        }
        let body: TokenResponse = resp.json().await?;
        body.token
            .or(body.access_token)
            .ok_or_else(|| RegistryError::Auth("token response without token".into()))
    }

    async fn docker(&self, step: &'static str, args: &[&str]) -> Result<(), RegistryError> {
        debug!(target: "dockstage.builder.registry", step, ?args, "running docker cli");
        let output = Command::new(&self.docker)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RegistryError::Command {
                step,
                reason: e.to_string(),
            })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(RegistryError::Command {
            step,
            reason: format!("{}: {}", output.status, stderr.trim()),
        })
    }
}

#[async_trait]
impl Registry for RemoteRegistry {
    #[instrument(level = "debug", skip_all, fields(image = %image))]
    async fn fetch_metadata(&self, image: &ImageRef) -> Result<ExecutionMetadata, RegistryError> {
        let base = self.base_url(&image.registry);
        let mut token = None;
        let accept = [MANIFEST_V2, MANIFEST_LIST_V2, OCI_MANIFEST, OCI_INDEX].join(", ");

        let url = format!("{base}/v2/{}/manifests/{}", image.repository, image.tag);
        let mut manifest: Manifest = self.get(&url, &accept, &mut token).await?.json().await?;

        if let Some(entries) = manifest.manifests.take() {
            let digest = select_platform(&entries)
                .ok_or_else(|| RegistryError::NoPlatform(image.to_string()))?;
            let url = format!("{base}/v2/{}/manifests/{digest}", image.repository);
            manifest = self.get(&url, &accept, &mut token).await?.json().await?;
        }

        let config = manifest
            .config
            .ok_or_else(|| RegistryError::InvalidManifest(format!("{image}: no config descriptor")))?;
        let url = format!("{base}/v2/{}/blobs/{}", image.repository, config.digest);
        let blob: ImageConfig = self.get(&url, "*/*", &mut token).await?.json().await?;

        let metadata = blob.into_metadata();
        info!(target: "dockstage.builder.registry", %image, "fetched image metadata");
        Ok(metadata)
    }

    #[instrument(level = "debug", skip_all, fields(source = %source, destination = %destination))]
    async fn cache(&self, source: &ImageRef, destination: &ImageRef) -> Result<(), RegistryError> {
        let source = source.to_string();
        let destination = destination.to_string();

        self.docker("pull", &["pull", &source]).await?;
        self.docker("tag", &["tag", &source, &destination]).await?;
        self.docker("push", &["push", &destination]).await?;

        info!(target: "dockstage.builder.registry", %source, %destination, "image cached");
        Ok(())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct Descriptor {
    digest: String,
    #[serde(default)]
    platform: Option<Platform>,
}

#[derive(Deserialize)]
struct Platform {
    os: String,
    architecture: String,
}

#[derive(Deserialize)]
struct Manifest {
    #[serde(default)]
    config: Option<Descriptor>,
    #[serde(default)]
    manifests: Option<Vec<Descriptor>>,
}

#[derive(Deserialize, Default)]
struct ImageConfig {
    #[serde(default)]
    config: ContainerConfig,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct ContainerConfig {
    #[serde(default)]
    cmd: Option<Vec<String>>,
    #[serde(default)]
    entrypoint: Option<Vec<String>>,
    #[serde(default)]
    env: Option<Vec<String>>,
    #[serde(default)]
    working_dir: Option<String>,
    #[serde(default)]
    exposed_ports: Option<BTreeMap<String, serde_json::Value>>,
}

impl ImageConfig {
    fn into_metadata(self) -> ExecutionMetadata {
        let c = self.config;
        let mut ports: Vec<ExposedPort> = c
            .exposed_ports
            .unwrap_or_default()
            .keys()
            .filter_map(|p| p.parse().ok())
            .collect();
        ports.sort();

        ExecutionMetadata {
            cmd: c.cmd.unwrap_or_default(),
            entrypoint: c.entrypoint.unwrap_or_default(),
            env: c.env.unwrap_or_default(),
            workdir: c.working_dir.filter(|w| !w.is_empty()),
            ports,
        }
    }
}

fn select_platform(entries: &[Descriptor]) -> Option<&str> {
    entries
        .iter()
        .find(|d| {
            d.platform
                .as_ref()
                .is_some_and(|p| p.os == TARGET_OS && p.architecture == TARGET_ARCH)
        })
        .map(|d| d.digest.as_str())
}

/// Parses `Bearer realm="..",service="..",scope=".."`.
fn parse_challenge(challenge: &str) -> Option<BTreeMap<String, String>> {
    let (scheme, params) = challenge.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut out = BTreeMap::new();
    let mut rest = params.trim();
    while !rest.is_empty() {
        let (key, after) = rest.split_once('=')?;
        let after = after.strip_prefix('"')?;
        let (value, tail) = after.split_once('"')?;
        out.insert(key.trim().to_string(), value.to_string());
        rest = tail.trim_start_matches([',', ' ']);
    }
    Some(out)
}

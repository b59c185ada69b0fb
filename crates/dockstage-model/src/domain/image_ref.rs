use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Registry used when the locator names no host.
pub const DEFAULT_REGISTRY: &str = "docker.io";
/// Tag used when the locator names none.
pub const DEFAULT_TAG: &str = "latest";

const URL_SCHEME: &str = "docker://";
const OFFICIAL_SCOPE: &str = "library";
const MAX_TAG_LEN: usize = 128;

/// Fully resolved image reference: `registry/repository:tag`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    /// Registry host, optionally with a port (`docker.io`, `10.0.0.1:5000`).
    pub registry: String,
    /// Repository path inside the registry (`library/ubuntu`, `scope/app`).
    pub repository: String,
    /// Tag, never empty.
    pub tag: String,
}

impl ImageRef {
    pub fn new(
        registry: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            registry: registry.into(),
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// Parses the URL form `docker://[registry/][scope/]repository[#tag]`.
    ///
    /// An empty host (`docker:///ubuntu`) selects [`DEFAULT_REGISTRY`].
    pub fn parse_url(url: &str) -> Result<Self, ModelError> {
        let rest = url
            .strip_prefix(URL_SCHEME)
            .ok_or_else(|| ModelError::reference(url, "expected docker:// scheme"))?;

        let (path, tag) = match rest.split_once('#') {
            Some((path, tag)) => (path, Some(tag)),
            None => (rest, None),
        };
        let path = path.strip_prefix('/').unwrap_or(path);
        Self::from_parts(url, path, tag)
    }

    /// Parses the reference form `[registry/][scope/]repository[:tag]`.
    pub fn parse_ref(reference: &str) -> Result<Self, ModelError> {
        let (name, tag) = match reference.rsplit_once(':') {
            // a colon followed by a slash belongs to the registry port
            Some((name, tag)) if !tag.contains('/') => (name, Some(tag)),
            _ => (reference, None),
        };
        Self::from_parts(reference, name, tag)
    }

    /// Returns `true` when the image lives on [`DEFAULT_REGISTRY`].
    pub fn is_default_registry(&self) -> bool {
        self.registry == DEFAULT_REGISTRY
    }

    fn from_parts(input: &str, name: &str, tag: Option<&str>) -> Result<Self, ModelError> {
        if name.is_empty() {
            return Err(ModelError::reference(input, "empty repository"));
        }

        let (registry, remainder) = match name.split_once('/') {
            Some((first, rest)) if is_registry_host(first) => (first, rest),
            _ => (DEFAULT_REGISTRY, name),
        };
        if remainder.is_empty() {
            return Err(ModelError::reference(input, "empty repository"));
        }

        let repository = if registry == DEFAULT_REGISTRY && !remainder.contains('/') {
            format!("{OFFICIAL_SCOPE}/{remainder}")
        } else {
            remainder.to_string()
        };
        if let Some(bad) = repository.split('/').find(|c| !is_valid_component(c)) {
            return Err(ModelError::reference(
                input,
                format!("invalid repository component [{bad}]"),
            ));
        }

        let tag = match tag {
            Some(tag) if !is_valid_tag(tag) => {
                return Err(ModelError::reference(input, format!("invalid tag [{tag}]")));
            }
            Some(tag) => tag,
            None => DEFAULT_TAG,
        };

        Ok(Self::new(registry, repository, tag))
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

impl FromStr for ImageRef {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_ref(s.trim())
    }
}

fn is_registry_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

fn is_valid_component(component: &str) -> bool {
    let bytes = component.as_bytes();
    let edge = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();

    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) if edge(first) && edge(last) => bytes
            .iter()
            .all(|b| edge(b) || matches!(b, b'.' | b'_' | b'-')),
        _ => false,
    }
}

fn is_valid_tag(tag: &str) -> bool {
    let bytes = tag.as_bytes();
    match bytes.first() {
        Some(first) if first.is_ascii_alphanumeric() || *first == b'_' => {
            bytes.len() <= MAX_TAG_LEN
                && bytes
                    .iter()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
        }
        _ => false,
    }
}

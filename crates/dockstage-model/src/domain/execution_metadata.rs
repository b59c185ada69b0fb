use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// What a downstream runtime needs to start the staged image.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    /// `KEY=value` pairs as stored in the image config.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ExposedPort>,
}

/// One exposed port, parsed from the `80/tcp` notation.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ExposedPort {
    pub port: u16,
    pub protocol: String,
}

impl FromStr for ExposedPort {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (port, protocol) = s.split_once('/').unwrap_or((s, "tcp"));
        let port = port
            .parse::<u16>()
            .map_err(|_| ModelError::InvalidPort(s.to_string()))?;
        if protocol.is_empty() {
            return Err(ModelError::InvalidPort(s.to_string()));
        }
        Ok(Self {
            port,
            protocol: protocol.to_ascii_lowercase(),
        })
    }
}

impl fmt::Display for ExposedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_defaults_to_tcp() {
        let p: ExposedPort = "8080".parse().unwrap();
        assert_eq!(p.to_string(), "8080/tcp");
        let p: ExposedPort = "53/UDP".parse().unwrap();
        assert_eq!(p.protocol, "udp");
        assert!("http/tcp".parse::<ExposedPort>().is_err());
        assert!("80/".parse::<ExposedPort>().is_err());
    }

    #[test]
    fn empty_fields_are_omitted() {
        let md = ExecutionMetadata {
            cmd: vec!["/bin/sh".into()],
            workdir: Some("/app".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&md).unwrap();
        assert_eq!(json, r#"{"cmd":["/bin/sh"],"workdir":"/app"}"#);
    }
}

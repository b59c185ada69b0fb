use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// A registry endpoint given as `host:port`, without a scheme.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistryAddress(String);

impl RegistryAddress {
    /// Validates a single address.
    pub fn parse(value: &str) -> Result<Self, ModelError> {
        let value = value.trim();
        if value.contains("://") {
            return Err(ModelError::SchemeNotAllowed(value.to_string()));
        }
        match value.split_once(':') {
            Some((host, port)) if !host.is_empty() && !port.is_empty() => {
                Ok(Self(value.to_string()))
            }
            _ => Err(ModelError::PortExpected(value.to_string())),
        }
    }

    /// Parses a comma separated list such as `10.0.0.1:5000, 10.0.0.2:5000`.
    pub fn parse_list(value: &str) -> Result<Vec<Self>, ModelError> {
        value.split(',').map(Self::parse).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RegistryAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid image reference [{reference}]: {reason}")]
    InvalidReference { reference: String, reason: String },
    #[error("no scheme allowed for registry address [{0}]")]
    SchemeNotAllowed(String),
    #[error("ip:port expected for registry address [{0}]")]
    PortExpected(String),
    #[error("invalid exposed port [{0}]")]
    InvalidPort(String),
}

impl ModelError {
    pub(crate) fn reference(reference: &str, reason: impl Into<String>) -> Self {
        ModelError::InvalidReference {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }
}

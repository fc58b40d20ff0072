//! Error types for Handy client operations

use thiserror::Error;

/// Result type alias for Handy client operations
pub type Result<T> = std::result::Result<T, HandyError>;

/// Prefix of the error message carried by synthetic transport failure bodies
pub(crate) const TRANSPORT_FAILURE_PREFIX: &str = "HTTP request failed";

/// Errors that can occur during Handy client operations
#[derive(Error, Debug)]
pub enum HandyError {
    /// No connection key set; nothing was sent
    #[error("No connection key provided")]
    MissingCredential,

    /// Device (or the transport on its behalf) reported a failure
    #[error("{0}")]
    Device(String),

    /// Response reported success but lacked the fields the command expects
    #[error("Unexpected response: {0}")]
    Projection(String),

    /// Caller-supplied data rejected before any network activity
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP client could not be constructed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl HandyError {
    /// Create a projection error for a field that is absent or of the wrong type
    pub fn missing_field(field: &str) -> Self {
        Self::Projection(format!("field '{}' missing or invalid", field))
    }

    /// Whether this failure originated in the transport rather than the device.
    ///
    /// Transport failures travel as synthetic failure bodies, so they can only
    /// be told apart by their message.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, Self::Device(message) if message.starts_with(TRANSPORT_FAILURE_PREFIX))
    }
}

impl From<reqwest::Error> for HandyError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<crate::config::ConfigError> for HandyError {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

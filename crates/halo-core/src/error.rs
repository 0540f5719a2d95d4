//! Error types for configuration and process setup.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, HaloError>;

/// Errors raised while loading configuration or initialising logging.
#[derive(Error, Debug)]
pub enum HaloError {
    /// Configuration could not be read or deserialized
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(#[from] Box<figment::Error>),

    /// Configuration was read but holds an invalid value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The global tracing subscriber could not be installed
    #[error("Failed to initialize tracing: {0}")]
    Tracing(String),

    /// A numeric identifier does not name a known pipeline topology
    #[error("Unknown pipeline id {0}: expected 0-9")]
    UnknownPipeline(u8),
}

impl From<figment::Error> for HaloError {
    fn from(err: figment::Error) -> Self {
        HaloError::ConfigLoad(Box::new(err))
    }
}

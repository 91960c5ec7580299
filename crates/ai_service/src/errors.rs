//! Prediction service error types

use penguin_ai_core::CoreError;
use thiserror::Error;

/// Errors that stop the service from starting or serving
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Model could not be resolved, fetched or validated
    #[error("Startup failed: {0}")]
    Startup(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<toml::de::Error> for ServiceError {
    fn from(err: toml::de::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Io(err.to_string())
    }
}

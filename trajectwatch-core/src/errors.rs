use std::io;

use thiserror::Error;

/// Result type used across the TrajectWatch core crate.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Errors raised by the traject store, the measurement log and process setup.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("deserialization error: {0}")]
    DeserializationError(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("logging setup failed: {0}")]
    LoggingError(String),
}

/// Dedicated configuration error used by the configuration module.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable missing: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

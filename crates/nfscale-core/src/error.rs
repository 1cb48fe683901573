//! Error types for configuration loading and HTTP transport.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading the configuration document.
///
/// All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors raised by [`crate::HttpClient`].
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("request failed: {0}")]
    Request(#[source] hyper::Error),

    #[error("failed to build request: {0}")]
    Build(#[from] http::Error),

    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Why a probe classified a service as down.
///
/// Latency degradation and certificate warnings are not errors; they are
/// reported as degraded outcomes by the probe itself.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Dial or connect failure
    #[error("connection to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("connection to {address} timed out after {timeout:?}")]
    Timeout { address: String, timeout: Duration },

    #[error("{0}")]
    Resolve(String),

    /// Missing or malformed banner/handshake
    #[error("{0}")]
    Protocol(String),

    /// The response did not match the configured expectation
    #[error("{message}")]
    Validation { code: i64, message: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("{0}")]
    Http(#[from] reqwest::Error),
}

impl ProbeError {
    pub fn protocol(message: impl Into<String>) -> Self {
        ProbeError::Protocol(message.into())
    }

    pub fn validation(code: i64, message: impl Into<String>) -> Self {
        ProbeError::Validation { code, message: message.into() }
    }

    /// Numeric code recorded alongside the down classification
    pub fn code(&self) -> i64 {
        match self {
            ProbeError::Validation { code, .. } => *code,
            ProbeError::Http(err) => err.status().map(|s| s.as_u16() as i64).unwrap_or(0),
            _ => 0,
        }
    }
}

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write config file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("no config path available: neither XDG_CONFIG_HOME nor HOME is set")]
    ConfigPathUnavailable,

    #[error("service #{index} has an empty name")]
    EmptyName { index: usize },

    #[error("duplicate service name: {0}")]
    DuplicateService(String),

    #[error("service {service}: {message}")]
    InvalidService { service: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(service: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidService { service: service.to_string(), message: message.into() }
    }
}

/// Errors raised by history persistence backends
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database query failed: {0}")]
    Database(#[from] libsql::Error),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("persistence gateway is closed")]
    Closed,
}

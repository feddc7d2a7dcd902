//! # Error Handling Module
//!
//! This module defines every error the response cache can produce, using the
//! `thiserror` crate, together with the HTTP status mapping used when an error
//! reaches the host framework.
//!
//! ## Error Taxonomy
//! - **Configuration** errors are fatal and only happen while constructing a
//!   [`ResponseCache`](crate::caching::ResponseCache) or loading a config file.
//! - **Cache read** errors are recovered inside the lookup stage: they are
//!   logged and the request is served by application logic, uncached.
//! - **Cache write** errors are returned from the store stage so the host can
//!   observe them through its own error path.
//!
//! Lower-level failures (JSON, Redis, I/O, YAML, TOML) convert into these
//! categories with `From` so `?` works everywhere.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Result type used throughout the crate
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors produced by the response cache
#[derive(Debug, Error, Clone)]
pub enum CacheError {
    /// Bad namespace, unsupported cache argument, invalid config file
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The cache engine could not answer a lookup
    #[error("Cache read error: {message}")]
    CacheRead { message: String },

    /// The cache engine could not persist an envelope
    #[error("Cache write error: {message}")]
    CacheWrite { message: String },

    /// Envelope or key (de)serialization failures
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Redis transport or protocol failures
    #[error("Redis error: {message}")]
    Redis { message: String },

    /// A cache operation exceeded the configured operation timeout
    #[error("Cache operation timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// I/O errors (config files)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },

    /// TOML parsing errors for configuration files
    #[error("TOML error: {message}")]
    Toml { message: String },
}

impl CacheError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a cache read error with a custom message
    pub fn read<S: Into<String>>(message: S) -> Self {
        Self::CacheRead {
            message: message.into(),
        }
    }

    /// Create a cache write error with a custom message
    pub fn write<S: Into<String>>(message: S) -> Self {
        Self::CacheWrite {
            message: message.into(),
        }
    }

    /// Re-label a lower-level failure as a read failure, keeping its message
    pub fn into_read(self) -> Self {
        match self {
            Self::CacheRead { .. } => self,
            other => Self::read(other.to_string()),
        }
    }

    /// Re-label a lower-level failure as a write failure, keeping its message
    pub fn into_write(self) -> Self {
        match self {
            Self::CacheWrite { .. } => self,
            other => Self::write(other.to_string()),
        }
    }

    /// HTTP status code reported to the host when this error escapes a stage
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Redis { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Transient failures a host may choose to retry at a higher level.
    /// The cache itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CacheRead { .. } | Self::CacheWrite { .. } | Self::Redis { .. } | Self::Timeout { .. }
        )
    }

    /// String representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::CacheRead { .. } => "cache_read_error",
            Self::CacheWrite { .. } => "cache_write_error",
            Self::Serialization { .. } => "serialization_error",
            Self::Redis { .. } => "redis_error",
            Self::Timeout { .. } => "timeout",
            Self::Io { .. } => "io_error",
            Self::Yaml { .. } => "yaml_error",
            Self::Toml { .. } => "toml_error",
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self::Redis {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for CacheError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for CacheError {
    fn from(err: toml::de::Error) -> Self {
        Self::Toml {
            message: err.to_string(),
        }
    }
}

/// Lets axum handlers and middleware return `CacheError` directly.
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
                "retryable": self.is_retryable(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}

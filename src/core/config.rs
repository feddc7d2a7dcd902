//! # Configuration Module
//!
//! This module holds the response cache settings and the configuration file
//! of the bundled service binary.
//!
//! ## Key Features
//! - Defaults for every cache option, with caller overrides merged on top
//! - YAML/TOML/JSON configuration parsing with serde
//! - Environment variable override support
//! - Validation with detailed error messages

use crate::caching::stores::CacheSource;
use crate::core::error::{CacheError, CacheResult};
use crate::observability::config::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Browser cache-validation headers that never take part in a cache key.
/// They vary per client and per revalidation and would defeat caching.
pub const DEFAULT_EXCLUDED_HEADERS: [&str; 5] = [
    "etag",
    "if-match",
    "if-none-match",
    "if-modified-since",
    "if-unmodified-since",
];

/// Settings of one response cache instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseCacheConfig {
    /// How long a stored response stays fresh
    #[serde(with = "humantime_serde")]
    pub expire: Duration,

    /// Leave request headers out of the cache key
    pub ignore_headers: bool,

    /// Leave the HTTP method out of the cache key
    pub ignore_method: bool,

    /// Leave the decoded query out of the cache key
    pub ignore_query: bool,

    /// Header names (case-insensitive) stripped before headers enter the key
    pub excluded_headers: Vec<String>,

    /// Upper bound for a single engine get/set; unbounded when `None`
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Option<Duration>,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            expire: Duration::from_secs(5 * 60),
            ignore_headers: false,
            ignore_method: false,
            ignore_query: false,
            excluded_headers: DEFAULT_EXCLUDED_HEADERS
                .iter()
                .map(|name| name.to_string())
                .collect(),
            operation_timeout: None,
        }
    }
}

impl ResponseCacheConfig {
    /// Defaults with the given overrides applied
    pub fn with_overrides(overrides: &ConfigOverrides) -> Self {
        overrides.merge_onto(Self::default())
    }

    pub fn validate(&self) -> CacheResult<()> {
        if self.expire.is_zero() {
            return Err(CacheError::config("expire must be greater than 0"));
        }
        if let Some(timeout) = self.operation_timeout {
            if timeout.is_zero() {
                return Err(CacheError::config("operation_timeout must be greater than 0"));
            }
        }
        Ok(())
    }
}

/// Caller-supplied partial configuration; unset fields keep their defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub expire: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_headers: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_method: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_query: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded_headers: Option<Vec<String>>,
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub operation_timeout: Option<Duration>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expire(mut self, expire: Duration) -> Self {
        self.expire = Some(expire);
        self
    }

    pub fn ignore_headers(mut self, ignore: bool) -> Self {
        self.ignore_headers = Some(ignore);
        self
    }

    pub fn ignore_method(mut self, ignore: bool) -> Self {
        self.ignore_method = Some(ignore);
        self
    }

    pub fn ignore_query(mut self, ignore: bool) -> Self {
        self.ignore_query = Some(ignore);
        self
    }

    pub fn excluded_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_headers = Some(headers.into_iter().map(Into::into).collect());
        self
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Apply every set field onto `base`
    pub fn merge_onto(&self, mut base: ResponseCacheConfig) -> ResponseCacheConfig {
        if let Some(expire) = self.expire {
            base.expire = expire;
        }
        if let Some(ignore) = self.ignore_headers {
            base.ignore_headers = ignore;
        }
        if let Some(ignore) = self.ignore_method {
            base.ignore_method = ignore;
        }
        if let Some(ignore) = self.ignore_query {
            base.ignore_query = ignore;
        }
        if let Some(headers) = &self.excluded_headers {
            base.excluded_headers = headers.clone();
        }
        if self.operation_timeout.is_some() {
            base.operation_timeout = self.operation_timeout;
        }
        base
    }
}

/// HTTP listener settings of the service binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Largest response body the store stage will buffer
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Configuration file of the service binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,

    /// Partition for every entry this service writes
    pub namespace: String,

    /// Cache engine URL: `memory://` or `redis://host:port/db`
    pub backend: String,

    /// Overrides for the cache defaults
    pub cache: ConfigOverrides,

    pub logging: LogConfig,

    /// Serve Prometheus metrics at `/metrics`
    pub metrics_enabled: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            namespace: "responses".to_string(),
            backend: "memory://".to_string(),
            cache: ConfigOverrides::default(),
            logging: LogConfig::default(),
            metrics_enabled: true,
        }
    }
}

impl ServiceConfig {
    /// Load a configuration file; the format follows the extension
    /// (`.yaml`/`.yml`, `.toml`, `.json`)
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> CacheResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CacheError::config(format!("Failed to read config file {}: {}", path.display(), e)))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let mut config: ServiceConfig = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "toml" => toml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            other => {
                return Err(CacheError::config(format!(
                    "Unsupported config file extension: {:?}",
                    other
                )))
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Variables follow the pattern `RESPONSE_CACHE_<FIELD>`,
    /// e.g. `RESPONSE_CACHE_EXPIRE=30s`.
    pub fn apply_env_overrides(&mut self) -> CacheResult<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> CacheResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(namespace) = lookup("RESPONSE_CACHE_NAMESPACE") {
            self.namespace = namespace;
        }

        if let Some(backend) = lookup("RESPONSE_CACHE_BACKEND") {
            self.backend = backend;
        }

        if let Some(addr) = lookup("RESPONSE_CACHE_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }

        if let Some(port) = lookup("RESPONSE_CACHE_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| CacheError::config(format!("Invalid RESPONSE_CACHE_PORT: {}", e)))?;
        }

        if let Some(expire) = lookup("RESPONSE_CACHE_EXPIRE") {
            self.cache.expire = Some(
                humantime::parse_duration(&expire)
                    .map_err(|e| CacheError::config(format!("Invalid RESPONSE_CACHE_EXPIRE: {}", e)))?,
            );
        }

        for (var, slot) in [
            ("RESPONSE_CACHE_IGNORE_HEADERS", &mut self.cache.ignore_headers),
            ("RESPONSE_CACHE_IGNORE_METHOD", &mut self.cache.ignore_method),
            ("RESPONSE_CACHE_IGNORE_QUERY", &mut self.cache.ignore_query),
        ] {
            if let Some(value) = lookup(var) {
                *slot = Some(
                    value
                        .parse()
                        .map_err(|e| CacheError::config(format!("Invalid {}: {}", var, e)))?,
                );
            }
        }

        if let Some(level) = lookup("RESPONSE_CACHE_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("RESPONSE_CACHE_LOG_FORMAT") {
            self.logging.format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" => LogFormat::Text,
                other => {
                    return Err(CacheError::config(format!(
                        "Invalid RESPONSE_CACHE_LOG_FORMAT: {}",
                        other
                    )))
                }
            };
        }

        Ok(())
    }

    /// Validation with every problem reported at once
    pub fn validate(&self) -> CacheResult<()> {
        let mut errors = Vec::new();

        if self.namespace.trim().is_empty() {
            errors.push("namespace cannot be empty".to_string());
        }

        if self.server.bind_address.is_empty() {
            errors.push("bind_address cannot be empty".to_string());
        }

        if self.server.max_body_bytes == 0 {
            errors.push("max_body_bytes must be greater than 0".to_string());
        }

        if let Err(e) = CacheSource::parse_url(&self.backend) {
            errors.push(e.to_string());
        }

        if let Err(e) = self.cache_config().validate() {
            errors.push(e.to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CacheError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )))
        }
    }

    /// Effective cache settings after merging the overrides onto defaults
    pub fn cache_config(&self) -> ResponseCacheConfig {
        ResponseCacheConfig::with_overrides(&self.cache)
    }
}

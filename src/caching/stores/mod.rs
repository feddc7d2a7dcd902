//! # Cache Engines
//!
//! The response cache talks to storage through [`ObjectCache`], an
//! object-field interface: entries live in a namespace and are addressed by a
//! structured [`CacheKey`]. Two engines are provided, in-memory and Redis.
//!
//! [`CacheSource`] describes what a caller hands to the constructor: nothing
//! (in-memory default), a ready engine, a raw Redis client or connection, or a
//! URL. Anything else is rejected as a configuration error.

pub mod memory;
pub mod redis_store;

pub use memory::{InMemoryCacheConfig, InMemoryObjectCache};
pub use redis_store::{RedisCacheConfig, RedisObjectCache};

use super::key_generator::CacheKey;
use crate::core::error::{CacheError, CacheResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Object-field cache engine
#[async_trait]
pub trait ObjectCache: Send + Sync {
    /// Raw value stored under `(namespace, field)`, `None` when absent
    async fn get(&self, namespace: &str, field: &CacheKey) -> CacheResult<Option<String>>;

    /// Store `value` under `(namespace, field)`, replacing any previous value
    async fn set(&self, namespace: &str, field: &CacheKey, value: &str) -> CacheResult<()>;

    /// Engine statistics
    async fn stats(&self) -> CacheResult<CacheStoreStats>;

    /// Perform health check
    async fn health_check(&self) -> CacheResult<bool>;

    /// Short engine name for logs
    fn name(&self) -> &'static str;
}

/// Cache engine statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStoreStats {
    /// Number of stored fields, when the engine can count them cheaply
    pub entries: Option<usize>,

    /// Reads that found a value
    pub hits: u64,

    /// Reads that found nothing
    pub misses: u64,

    /// Failed engine operations
    pub errors: u64,

    /// Fields dropped to respect a capacity bound
    pub evictions: u64,
}

/// What the caller supplies as the cache argument
pub enum CacheSource {
    /// A fresh in-memory engine
    Memory,

    /// An already constructed engine
    Engine(Arc<dyn ObjectCache>),

    /// A Redis client; a managed connection is opened on construction
    RedisClient(redis::Client),

    /// An open Redis connection, wrapped as is
    RedisConnection(ConnectionManager),

    /// `memory://` or a `redis://` / `rediss://` URL
    Url(String),
}

impl CacheSource {
    /// Classify a URL. Only `memory://` and Redis URLs are accepted.
    pub fn parse_url(url: &str) -> CacheResult<Self> {
        let url = url.trim();

        if url == "memory" || url == "memory://" {
            return Ok(Self::Memory);
        }

        let is_redis = ["redis://", "rediss://", "redis+unix://", "unix://"]
            .iter()
            .any(|scheme| url.starts_with(scheme));

        if is_redis {
            let client = redis::Client::open(url)
                .map_err(|e| CacheError::config(format!("Invalid Redis URL {:?}: {}", url, e)))?;
            return Ok(Self::RedisClient(client));
        }

        Err(CacheError::config(format!(
            "Unsupported cache argument {:?}: expected memory://, a Redis URL, a Redis connection or an ObjectCache engine",
            url
        )))
    }

    /// Resolve into a usable engine, connecting to Redis if needed
    pub async fn into_engine(self) -> CacheResult<Arc<dyn ObjectCache>> {
        let source = match self {
            Self::Url(url) => Self::parse_url(&url)?,
            other => other,
        };

        match source {
            Self::Memory => Ok(Arc::new(InMemoryObjectCache::new(InMemoryCacheConfig::default()))),
            Self::Engine(engine) => Ok(engine),
            Self::RedisClient(client) => {
                let engine = RedisObjectCache::connect(client, RedisCacheConfig::default()).await?;
                Ok(Arc::new(engine))
            }
            Self::RedisConnection(connection) => Ok(Arc::new(RedisObjectCache::from_connection(
                connection,
                RedisCacheConfig::default(),
            ))),
            Self::Url(url) => Err(CacheError::config(format!("Unresolved cache URL {:?}", url))),
        }
    }
}

impl fmt::Debug for CacheSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("Memory"),
            Self::Engine(engine) => f.debug_tuple("Engine").field(&engine.name()).finish(),
            Self::RedisClient(_) => f.write_str("RedisClient"),
            Self::RedisConnection(_) => f.write_str("RedisConnection"),
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
        }
    }
}

impl From<Arc<dyn ObjectCache>> for CacheSource {
    fn from(engine: Arc<dyn ObjectCache>) -> Self {
        Self::Engine(engine)
    }
}

impl From<redis::Client> for CacheSource {
    fn from(client: redis::Client) -> Self {
        Self::RedisClient(client)
    }
}

impl From<ConnectionManager> for CacheSource {
    fn from(connection: ConnectionManager) -> Self {
        Self::RedisConnection(connection)
    }
}

impl From<&str> for CacheSource {
    fn from(url: &str) -> Self {
        Self::Url(url.to_string())
    }
}

impl From<String> for CacheSource {
    fn from(url: String) -> Self {
        Self::Url(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory_url() {
        assert!(matches!(CacheSource::parse_url("memory://"), Ok(CacheSource::Memory)));
        assert!(matches!(CacheSource::parse_url(" memory "), Ok(CacheSource::Memory)));
    }

    #[test]
    fn test_parse_redis_url() {
        let source = CacheSource::parse_url("redis://127.0.0.1:6379/0").unwrap();
        assert!(matches!(source, CacheSource::RedisClient(_)));
    }

    #[test]
    fn test_plain_string_rejected() {
        let err = CacheSource::parse_url("lame").unwrap_err();
        assert!(matches!(err, CacheError::Configuration { .. }));

        let err = CacheSource::parse_url("memcached://localhost:11211").unwrap_err();
        assert!(err.to_string().contains("Unsupported cache argument"));
    }

    #[tokio::test]
    async fn test_url_source_resolves_memory_engine() {
        let engine = CacheSource::from("memory://").into_engine().await.unwrap();
        assert_eq!(engine.name(), "memory");
    }

    #[tokio::test]
    async fn test_url_source_rejects_unknown_scheme() {
        let result = CacheSource::from("a plain string".to_string()).into_engine().await;
        assert!(matches!(result, Err(CacheError::Configuration { .. })));
    }
}

//! # Redis Cache Engine
//!
//! Each namespace maps to one Redis hash (`<key_prefix><namespace>`); cache
//! keys are hash fields. Fields longer than `max_field_length` are replaced
//! by `hash:<sha256>` of their canonical encoding.

use super::{CacheStoreStats, ObjectCache};
use crate::caching::key_generator::CacheKey;
use crate::core::error::CacheResult;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info};

/// Redis engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisCacheConfig {
    /// Prefix prepended to every namespace hash name
    pub key_prefix: String,

    /// Longest field stored verbatim
    pub max_field_length: usize,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: "response-cache:".to_string(),
            max_field_length: 250,
        }
    }
}

/// Redis-backed [`ObjectCache`]
pub struct RedisObjectCache {
    config: RedisCacheConfig,

    /// Multiplexed, auto-reconnecting connection; cheap to clone per call
    connection: ConnectionManager,

    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

impl RedisObjectCache {
    /// Open a managed connection from a client
    pub async fn connect(client: Client, config: RedisCacheConfig) -> CacheResult<Self> {
        let connection = ConnectionManager::new(client).await?;

        info!(prefix = %config.key_prefix, "Redis cache connected");

        Ok(Self::from_connection(connection, config))
    }

    /// Open a connection from a URL
    pub async fn from_url(url: &str, config: RedisCacheConfig) -> CacheResult<Self> {
        Self::connect(Client::open(url)?, config).await
    }

    /// Wrap an existing connection
    pub fn from_connection(connection: ConnectionManager, config: RedisCacheConfig) -> Self {
        Self {
            config,
            connection,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Hash name holding a namespace
    fn hash_key(&self, namespace: &str) -> String {
        format!("{}{}", self.config.key_prefix, namespace)
    }

    fn record_error(&self, operation: &str, err: &redis::RedisError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        error!("Redis {} failed: {}", operation, err);
    }
}

#[async_trait]
impl ObjectCache for RedisObjectCache {
    async fn get(&self, namespace: &str, field: &CacheKey) -> CacheResult<Option<String>> {
        let hash = self.hash_key(namespace);
        let field = field.bounded_field(self.config.max_field_length)?;
        let mut conn = self.connection.clone();

        let value: Option<String> = conn.hget(&hash, &field).await.map_err(|e| {
            self.record_error("HGET", &e);
            e
        })?;

        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Redis cache hit in {}", hash);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("Redis cache miss in {}", hash);
        }

        Ok(value)
    }

    async fn set(&self, namespace: &str, field: &CacheKey, value: &str) -> CacheResult<()> {
        let hash = self.hash_key(namespace);
        let field = field.bounded_field(self.config.max_field_length)?;
        let mut conn = self.connection.clone();

        conn.hset::<_, _, _, ()>(&hash, &field, value)
            .await
            .map_err(|e| {
                self.record_error("HSET", &e);
                e
            })?;

        Ok(())
    }

    async fn stats(&self) -> CacheResult<CacheStoreStats> {
        Ok(CacheStoreStats {
            entries: None,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            evictions: 0,
        })
    }

    async fn health_check(&self) -> CacheResult<bool> {
        let mut conn = self.connection.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await.map_err(|e| {
            self.record_error("PING", &e);
            e
        })?;
        Ok(pong == "PONG")
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

impl std::fmt::Debug for RedisObjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisObjectCache")
            .field("config", &self.config)
            .finish()
    }
}

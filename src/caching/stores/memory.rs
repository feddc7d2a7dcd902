//! # In-Memory Cache Engine
//!
//! Process-local object-field cache used when no external store is supplied.
//! Entries never expire here (freshness is judged by the response cache from
//! the envelope), but the engine is bounded and evicts the least recently
//! used field when full.

use super::{CacheStoreStats, ObjectCache};
use crate::caching::key_generator::CacheKey;
use crate::core::error::{CacheError, CacheResult};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// In-memory engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryCacheConfig {
    /// Maximum number of fields across all namespaces
    pub max_entries: usize,

    /// Evict least recently used fields when full; reject writes otherwise
    pub enable_lru: bool,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10000,
            enable_lru: true,
        }
    }
}

#[derive(Debug)]
struct StoredValue {
    value: String,
    last_access: u64,
}

/// In-memory engine keyed by `(namespace, canonical field)`
pub struct InMemoryObjectCache {
    config: InMemoryCacheConfig,

    entries: Arc<DashMap<(String, String), StoredValue>>,

    /// Monotonic access counter used as the LRU clock
    access_seq: AtomicU64,

    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl InMemoryObjectCache {
    pub fn new(config: InMemoryCacheConfig) -> Self {
        Self {
            config,
            entries: Arc::new(DashMap::new()),
            access_seq: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn next_access(&self) -> u64 {
        self.access_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of stored fields
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Make room for one new field
    fn evict_if_needed(&self, incoming: &(String, String)) -> CacheResult<()> {
        if self.entries.len() < self.config.max_entries || self.entries.contains_key(incoming) {
            return Ok(());
        }

        if !self.config.enable_lru {
            return Err(CacheError::write("Cache is full and LRU eviction is disabled"));
        }

        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().last_access)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            if self.entries.remove(&key).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(namespace = %key.0, "Evicted least recently used cache field");
            }
        }

        Ok(())
    }
}

impl Default for InMemoryObjectCache {
    fn default() -> Self {
        Self::new(InMemoryCacheConfig::default())
    }
}

#[async_trait]
impl ObjectCache for InMemoryObjectCache {
    async fn get(&self, namespace: &str, field: &CacheKey) -> CacheResult<Option<String>> {
        let key = (namespace.to_string(), field.field()?);

        if let Some(mut entry) = self.entries.get_mut(&key) {
            entry.last_access = self.next_access();
            self.hits.fetch_add(1, Ordering::Relaxed);
            Ok(Some(entry.value.clone()))
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            Ok(None)
        }
    }

    async fn set(&self, namespace: &str, field: &CacheKey, value: &str) -> CacheResult<()> {
        let key = (namespace.to_string(), field.field()?);
        self.evict_if_needed(&key)?;

        let stored = StoredValue {
            value: value.to_string(),
            last_access: self.next_access(),
        };
        self.entries.insert(key, stored);
        Ok(())
    }

    async fn stats(&self) -> CacheResult<CacheStoreStats> {
        Ok(CacheStoreStats {
            entries: Some(self.entries.len()),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: 0,
            evictions: self.evictions.load(Ordering::Relaxed),
        })
    }

    async fn health_check(&self) -> CacheResult<bool> {
        // Round-trip a value in a private namespace. Bypasses `set` so a full
        // engine neither evicts a live field nor rejects the check.
        let key = ("__health_check__".to_string(), "__health_check__".to_string());
        self.entries.insert(
            key.clone(),
            StoredValue {
                value: "ok".to_string(),
                last_access: self.next_access(),
            },
        );
        let retrieved = self.entries.remove(&key).map(|(_, stored)| stored.value);

        Ok(retrieved.as_deref() == Some("ok"))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl std::fmt::Debug for InMemoryObjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectCache")
            .field("config", &self.config)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl Drop for InMemoryObjectCache {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            info!("Dropping in-memory cache with {} fields", self.entries.len());
        }
    }
}

//! # Response Caching
//!
//! Caches JSON responses of idempotent `GET` requests in a namespaced
//! object-field store (in-memory or Redis).
//!
//! ## Architecture
//! 1. **Key derivation**: structured [`CacheKey`] built from the request
//! 2. **Lookup stage**: decides HIT / MISS / BYPASS before the handler runs
//! 3. **Store stage**: stamps expiry metadata and writes the envelope after it
//! 4. **Engines**: [`ObjectCache`] implementations behind the stages
//!
//! ## Usage Example
//! ```rust,no_run
//! use response_cache::caching::{ResponseCache, Decision};
//! use response_cache::core::config::ConfigOverrides;
//! use response_cache::core::types::{CachedResponse, IncomingRequest, ResponseHeaders};
//! use axum::http::{HeaderMap, Method, StatusCode};
//! use std::time::Duration;
//!
//! # async fn example() -> response_cache::core::error::CacheResult<()> {
//! let cache = ResponseCache::new(
//!     "users",
//!     ConfigOverrides::new().expire(Duration::from_secs(60)),
//!     None,
//! )
//! .await?;
//!
//! let request = IncomingRequest::new(Method::GET, "/users".parse().unwrap(), HeaderMap::new(), Vec::new());
//! let outcome = cache.lookup(&request, &ResponseHeaders::new()).await;
//! if outcome.decision != Decision::Hit {
//!     let produced = CachedResponse::json(StatusCode::OK, serde_json::json!({"users": []}));
//!     cache.store(&request, &outcome.state, produced).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod envelope;
pub mod hooks;
pub mod key_generator;
pub mod middleware;
pub mod stores;

pub use envelope::{CacheMetadata, CachedEnvelope};
pub use hooks::{CacheObserver, FnObserver, NoopObserver};
pub use key_generator::{CacheKey, KeyDeriver};
pub use middleware::{Decision, LookupOutcome, RequestCacheState, ResponseCache, ResponseCacheBuilder};
pub use stores::{CacheSource, CacheStoreStats, InMemoryObjectCache, ObjectCache, RedisObjectCache};

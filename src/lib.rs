//! # Response Cache
//!
//! HTTP response caching middleware for JSON APIs.
//!
//! Idempotent `GET` responses are stored in a namespaced object-field cache
//! (in-memory or Redis) under a key derived from the request, stamped with
//! an absolute expiry, and served back until that expiry passes. Requests
//! carrying `Cache-Control: no-cache` and non-`GET` requests always reach the
//! application.
//!
//! ## Modules
//! - [`core`]: error type, configuration, clock, framework-neutral request and
//!   response types
//! - [`caching`]: key derivation, envelope format, lookup/store stages and
//!   cache engines
//! - [`middleware`]: axum middleware functions wrapping the two stages
//! - [`observability`]: tracing subscriber setup and metrics

pub mod core;

pub mod caching;

pub mod middleware;

pub mod observability;

/// Main error type used throughout the crate
pub use core::error::{CacheError, CacheResult};

pub use core::config::{ConfigOverrides, ResponseCacheConfig, ServiceConfig};

pub use core::types::{CachedResponse, IncomingRequest, ResponseHeaders};

pub use caching::{CacheSource, Decision, LookupOutcome, RequestCacheState, ResponseCache};

pub use middleware::{cache_layer, cache_lookup, cache_store, CacheMiddlewareState};

//! # Response Cache
//!
//! [`ResponseCache`] runs the two cache stages around application logic:
//!
//! 1. [`lookup`](ResponseCache::lookup) before the handler decides whether the
//!    request may be served from the cache and returns a [`LookupOutcome`].
//! 2. [`store`](ResponseCache::store) after the handler stamps the produced
//!    response with cache metadata and persists it, when the lookup flagged
//!    the request as needing a fresh entry.
//!
//! Only `GET` requests without a `Cache-Control: no-cache` directive take part.
//! Read failures are logged and treated as misses that do not refill the
//! cache; write failures are returned to the caller.

use super::envelope::{CacheMetadata, CachedEnvelope};
use super::hooks::{CacheObserver, FnObserver, NoopObserver};
use super::key_generator::{CacheKey, KeyDeriver};
use super::stores::{CacheSource, CacheStoreStats, ObjectCache};
use crate::core::clock::{Clock, SystemClock};
use crate::core::config::{ConfigOverrides, ResponseCacheConfig};
use crate::core::error::{CacheError, CacheResult};
use crate::core::types::{CachedResponse, IncomingRequest, ResponseHeaders};
use crate::observability::metrics::{record_lookup, record_store};
use axum::http::{header, Method};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// How a lookup ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// `Cache-Control: no-cache` on the request
    BypassNoCacheHeader,
    /// Method other than GET
    BypassNonGet,
    /// Nothing stored under the key
    MissEmpty,
    /// Stored entry carries no expiration
    MissNoExpiration,
    /// Stored entry is stale
    MissExpired,
    /// Fresh entry served
    Hit,
    /// The engine failed or returned something unreadable
    MissError,
}

impl Decision {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BypassNoCacheHeader => "bypass_no_cache_header",
            Self::BypassNonGet => "bypass_non_get",
            Self::MissEmpty => "miss_empty",
            Self::MissNoExpiration => "miss_no_expiration",
            Self::MissExpired => "miss_expired",
            Self::Hit => "hit",
            Self::MissError => "miss_error",
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit)
    }

    /// Whether the handler's response should be written back
    pub fn needs_cache(&self) -> bool {
        matches!(
            self,
            Self::MissEmpty | Self::MissNoExpiration | Self::MissExpired
        )
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request cache state handed from the lookup stage to the store stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestCacheState {
    /// The response produced for this request should be stored
    pub needs_cache: bool,

    /// The response was served from the cache
    pub used_cache: bool,

    /// Key derived during lookup; absent for bypassed requests
    pub cache_key: Option<CacheKey>,

    /// A cached response has been placed on the outgoing response
    pub has_data: bool,
}

/// Result of the lookup stage
#[derive(Debug, Clone)]
pub struct LookupOutcome {
    pub decision: Decision,
    pub state: RequestCacheState,

    /// Response to send instead of running the handler; set only on a hit
    pub response: Option<CachedResponse>,
}

impl LookupOutcome {
    fn bypass(decision: Decision) -> Self {
        Self {
            decision,
            state: RequestCacheState::default(),
            response: None,
        }
    }

    fn miss(decision: Decision, mut state: RequestCacheState) -> Self {
        state.needs_cache = decision.needs_cache();
        Self {
            decision,
            state,
            response: None,
        }
    }
}

/// Caches JSON responses in a namespace of an [`ObjectCache`]
#[derive(Clone)]
pub struct ResponseCache {
    namespace: String,
    config: ResponseCacheConfig,
    deriver: KeyDeriver,
    cache: Arc<dyn ObjectCache>,
    observer: Arc<dyn CacheObserver>,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    /// Create a cache for `namespace`.
    ///
    /// `source` selects the engine; `None` uses a fresh in-memory engine.
    /// Fails with [`CacheError::Configuration`] on an empty namespace, an
    /// invalid option or an unsupported cache argument.
    pub async fn new(
        namespace: impl Into<String>,
        overrides: ConfigOverrides,
        source: Option<CacheSource>,
    ) -> CacheResult<Self> {
        let mut builder = Self::builder(namespace).overrides(overrides);
        if let Some(source) = source {
            builder = builder.cache(source);
        }
        builder.build().await
    }

    pub fn builder(namespace: impl Into<String>) -> ResponseCacheBuilder {
        ResponseCacheBuilder::new(namespace)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn config(&self) -> &ResponseCacheConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn ObjectCache> {
        &self.cache
    }

    /// Key the request would be cached under
    pub fn derive_key(&self, request: &IncomingRequest) -> CacheKey {
        self.deriver.derive(request)
    }

    pub async fn stats(&self) -> CacheResult<CacheStoreStats> {
        self.cache.stats().await
    }

    pub async fn health_check(&self) -> CacheResult<bool> {
        self.cache.health_check().await
    }

    /// Decide whether `request` can be answered from the cache.
    ///
    /// `local_headers` are the headers already set on the outgoing response;
    /// on a hit they are merged over the cached ones. Never fails: engine
    /// errors end as [`Decision::MissError`]. Exactly one observer callback
    /// runs per call.
    pub async fn lookup(
        &self,
        request: &IncomingRequest,
        local_headers: &ResponseHeaders,
    ) -> LookupOutcome {
        let started = Instant::now();
        let (outcome, envelope) = self.evaluate(request, local_headers).await;

        debug!(
            namespace = %self.namespace,
            method = %request.method,
            uri = %request.uri,
            decision = outcome.decision.as_str(),
            "Cache lookup"
        );
        record_lookup(&self.namespace, outcome.decision, started.elapsed());

        match (&outcome.response, &envelope) {
            (Some(response), Some(envelope)) => {
                self.observer.on_cache_hit(request, response, envelope)
            }
            _ => self.observer.on_cache_miss(request, outcome.decision),
        }

        outcome
    }

    async fn evaluate(
        &self,
        request: &IncomingRequest,
        local_headers: &ResponseHeaders,
    ) -> (LookupOutcome, Option<CachedEnvelope>) {
        if has_no_cache_directive(request) {
            return (LookupOutcome::bypass(Decision::BypassNoCacheHeader), None);
        }

        if request.method != Method::GET {
            return (LookupOutcome::bypass(Decision::BypassNonGet), None);
        }

        let key = self.deriver.derive(request);
        let state = RequestCacheState {
            cache_key: Some(key.clone()),
            ..Default::default()
        };

        let envelope = match self.read(&key).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return (LookupOutcome::miss(Decision::MissEmpty, state), None),
            Err(err) => {
                error!(
                    namespace = %self.namespace,
                    key = %key,
                    error = %err,
                    "Cache lookup failed, serving uncached"
                );
                return (LookupOutcome::miss(Decision::MissError, state), None);
            }
        };

        let now = self.clock.now_millis();
        match envelope.expiration() {
            None => (LookupOutcome::miss(Decision::MissNoExpiration, state), None),
            Some(expiration) if now >= expiration => {
                (LookupOutcome::miss(Decision::MissExpired, state), None)
            }
            Some(_) => {
                let outcome = LookupOutcome {
                    decision: Decision::Hit,
                    state: RequestCacheState {
                        used_cache: true,
                        has_data: true,
                        ..state
                    },
                    response: Some(envelope.to_response(local_headers)),
                };
                (outcome, Some(envelope))
            }
        }
    }

    /// Persist the handler's response when the lookup asked for it.
    ///
    /// Returns the response as it should be sent: stamped with cache metadata
    /// when stored, untouched otherwise.
    pub async fn store(
        &self,
        request: &IncomingRequest,
        state: &RequestCacheState,
        mut response: CachedResponse,
    ) -> CacheResult<CachedResponse> {
        if !state.needs_cache {
            return Ok(response);
        }

        let key = self.deriver.derive(request);

        CacheMetadata::new(self.clock.now(), self.config.expire).stamp(&mut response.body);
        let envelope = CachedEnvelope::from(response.clone());

        let result = self.write(&key, &envelope).await;
        record_store(&self.namespace, result.is_ok());

        match result {
            Ok(()) => {
                debug!(namespace = %self.namespace, key = %key, status = response.status, "Response cached");
                Ok(response)
            }
            Err(err) => {
                error!(namespace = %self.namespace, key = %key, error = %err, "Failed to cache response");
                Err(err.into_write())
            }
        }
    }

    async fn read(&self, key: &CacheKey) -> CacheResult<Option<CachedEnvelope>> {
        let raw = self
            .bounded(self.cache.get(&self.namespace, key))
            .await
            .map_err(CacheError::into_read)?;

        raw.map(|raw| CachedEnvelope::from_json(&raw))
            .transpose()
            .map_err(CacheError::into_read)
    }

    async fn write(&self, key: &CacheKey, envelope: &CachedEnvelope) -> CacheResult<()> {
        let raw = envelope.to_json()?;
        self.bounded(self.cache.set(&self.namespace, key, &raw)).await
    }

    /// Apply the configured operation timeout, if any
    async fn bounded<T, F>(&self, operation: F) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        match self.config.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, operation)
                .await
                .map_err(|_| CacheError::Timeout {
                    timeout_ms: limit.as_millis() as u64,
                })?,
            None => operation.await,
        }
    }
}

impl fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("namespace", &self.namespace)
            .field("config", &self.config)
            .field("engine", &self.cache.name())
            .finish()
    }
}

/// `Cache-Control` carries a `no-cache` directive
fn has_no_cache_directive(request: &IncomingRequest) -> bool {
    request
        .headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|directive| directive.trim().eq_ignore_ascii_case("no-cache"))
}

/// Builder for [`ResponseCache`]
pub struct ResponseCacheBuilder {
    namespace: String,
    config: ResponseCacheConfig,
    overrides: ConfigOverrides,
    source: Option<CacheSource>,
    observer: Option<Arc<dyn CacheObserver>>,
    callbacks: Option<FnObserver>,
    clock: Arc<dyn Clock>,
}

impl ResponseCacheBuilder {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            config: ResponseCacheConfig::default(),
            overrides: ConfigOverrides::default(),
            source: None,
            observer: None,
            callbacks: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the base configuration
    pub fn config(mut self, config: ResponseCacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Options applied on top of the base configuration
    pub fn overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn cache(mut self, source: impl Into<CacheSource>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Observer notified of every lookup; replaces any closures set with
    /// [`on_cache_hit`](Self::on_cache_hit) / [`on_cache_miss`](Self::on_cache_miss)
    pub fn observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn on_cache_hit<F>(mut self, f: F) -> Self
    where
        F: Fn(&IncomingRequest, &CachedResponse, &CachedEnvelope) + Send + Sync + 'static,
    {
        self.callbacks = Some(self.callbacks.take().unwrap_or_default().on_hit(f));
        self
    }

    pub fn on_cache_miss<F>(mut self, f: F) -> Self
    where
        F: Fn(&IncomingRequest, Decision) + Send + Sync + 'static,
    {
        self.callbacks = Some(self.callbacks.take().unwrap_or_default().on_miss(f));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn build(self) -> CacheResult<ResponseCache> {
        let namespace = self.namespace.trim().to_string();
        if namespace.is_empty() {
            return Err(CacheError::config("namespace must be a non-empty string"));
        }

        let config = self.overrides.merge_onto(self.config);
        config.validate()?;

        let cache = self.source.unwrap_or(CacheSource::Memory).into_engine().await?;

        let observer: Arc<dyn CacheObserver> = match (self.observer, self.callbacks) {
            (Some(observer), _) => observer,
            (None, Some(callbacks)) => Arc::new(callbacks),
            (None, None) => Arc::new(NoopObserver),
        };

        info!(
            namespace = %namespace,
            engine = cache.name(),
            expire = ?config.expire,
            "Response cache ready"
        );

        Ok(ResponseCache {
            namespace,
            deriver: KeyDeriver::new(&config),
            config,
            cache,
            observer,
            clock: self.clock,
        })
    }
}

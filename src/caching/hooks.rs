//! Hit/miss observers.
//!
//! Every lookup ends by notifying the observer exactly once: `on_cache_hit`
//! for a served entry, `on_cache_miss` for every miss and bypass. A miss has
//! no response yet, so only the hit callback receives one.

use super::envelope::CachedEnvelope;
use super::middleware::Decision;
use crate::core::types::{CachedResponse, IncomingRequest};
use std::fmt;
use std::sync::Arc;

/// Receives the outcome of each lookup
pub trait CacheObserver: Send + Sync {
    /// `response` is what will be served: the stored envelope with local
    /// headers merged over it.
    fn on_cache_hit(
        &self,
        _request: &IncomingRequest,
        _response: &CachedResponse,
        _envelope: &CachedEnvelope,
    ) {
    }

    fn on_cache_miss(&self, _request: &IncomingRequest, _decision: Decision) {}
}

/// Default observer; ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl CacheObserver for NoopObserver {}

type HitFn = Arc<dyn Fn(&IncomingRequest, &CachedResponse, &CachedEnvelope) + Send + Sync>;
type MissFn = Arc<dyn Fn(&IncomingRequest, Decision) + Send + Sync>;

/// Observer built from closures
#[derive(Clone, Default)]
pub struct FnObserver {
    on_hit: Option<HitFn>,
    on_miss: Option<MissFn>,
}

impl FnObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_hit<F>(mut self, f: F) -> Self
    where
        F: Fn(&IncomingRequest, &CachedResponse, &CachedEnvelope) + Send + Sync + 'static,
    {
        self.on_hit = Some(Arc::new(f));
        self
    }

    pub fn on_miss<F>(mut self, f: F) -> Self
    where
        F: Fn(&IncomingRequest, Decision) + Send + Sync + 'static,
    {
        self.on_miss = Some(Arc::new(f));
        self
    }
}

impl CacheObserver for FnObserver {
    fn on_cache_hit(
        &self,
        request: &IncomingRequest,
        response: &CachedResponse,
        envelope: &CachedEnvelope,
    ) {
        if let Some(f) = &self.on_hit {
            f(request, response, envelope);
        }
    }

    fn on_cache_miss(&self, request: &IncomingRequest, decision: Decision) {
        if let Some(f) = &self.on_miss {
            f(request, decision);
        }
    }
}

impl fmt::Debug for FnObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnObserver")
            .field("on_hit", &self.on_hit.is_some())
            .field("on_miss", &self.on_miss.is_some())
            .finish()
    }
}

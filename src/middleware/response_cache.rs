//! Axum adapter for [`ResponseCache`].
//!
//! Two middleware functions mirror the two cache stages and can be registered
//! separately, `cache_lookup` outside `cache_store`:
//!
//! ```rust,no_run
//! # use axum::{middleware, routing::get, Router};
//! # use response_cache::middleware::response_cache::{cache_lookup, cache_store, CacheMiddlewareState};
//! # fn app(state: CacheMiddlewareState) -> Router {
//! Router::new()
//!     .route("/users/:id", get(|| async { "{}" }))
//!     .layer(middleware::from_fn_with_state(state.clone(), cache_store))
//!     .layer(middleware::from_fn_with_state(state, cache_lookup))
//! # }
//! ```
//!
//! [`cache_layer`] runs both stages around the handler in one middleware.
//! On a hit the handler is never called.

use crate::caching::middleware::{RequestCacheState, ResponseCache};
use crate::core::error::CacheError;
use crate::core::types::{CachedResponse, IncomingRequest, ResponseHeaders};
use axum::{
    body::{to_bytes, Body, Bytes, HttpBody},
    extract::{Path, Request, State},
    http::{header, response::Parts, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default limit for buffered request and response bodies (1 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Headers that describe the encoding of one particular body and are never
/// carried from a produced response into the cache
const HOP_HEADERS: [&str; 2] = ["content-length", "transfer-encoding"];

/// Joins the values of a repeated header in a cached entry. Header values
/// cannot contain a newline, so splitting restores every original value.
const HEADER_VALUE_SEPARATOR: &str = "\n";

/// Shared state of the cache middleware
#[derive(Clone)]
pub struct CacheMiddlewareState {
    pub cache: Arc<ResponseCache>,

    /// Largest request or response body buffered for caching
    pub max_body_bytes: usize,
}

impl CacheMiddlewareState {
    pub fn new(cache: ResponseCache) -> Self {
        Self {
            cache: Arc::new(cache),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

/// Request extension left by the lookup stage for the store stage
#[derive(Debug, Clone)]
pub struct CacheContext {
    pub request: IncomingRequest,
    pub state: RequestCacheState,
}

/// Lookup stage. Serves hits directly; otherwise records a [`CacheContext`]
/// in the request extensions and calls the next service.
pub async fn cache_lookup(
    State(state): State<CacheMiddlewareState>,
    params: Option<Path<HashMap<String, String>>>,
    request: Request,
    next: Next,
) -> Response {
    match begin(&state, params, request).await {
        Ok((mut request, context)) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(response) => response,
    }
}

/// Store stage. Persists the handler's response when the lookup stage asked
/// for it; a failed write is answered with the error response.
pub async fn cache_store(
    State(state): State<CacheMiddlewareState>,
    request: Request,
    next: Next,
) -> Response {
    let context = request.extensions().get::<CacheContext>().cloned();
    let response = next.run(request).await;

    match context {
        Some(context) => finish(&state, context, response).await,
        None => response,
    }
}

/// Both stages around the handler
pub async fn cache_layer(
    State(state): State<CacheMiddlewareState>,
    params: Option<Path<HashMap<String, String>>>,
    request: Request,
    next: Next,
) -> Response {
    match begin(&state, params, request).await {
        Ok((request, context)) => {
            let response = next.run(request).await;
            finish(&state, context, response).await
        }
        Err(response) => response,
    }
}

/// Run the lookup. `Err` carries the response to send right away.
async fn begin(
    state: &CacheMiddlewareState,
    params: Option<Path<HashMap<String, String>>>,
    request: Request,
) -> Result<(Request, CacheContext), Response> {
    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE.into_response())?;

    let incoming = IncomingRequest::new(
        parts.method.clone(),
        parts.uri.clone(),
        parts.headers.clone(),
        bytes.to_vec(),
    )
    .with_params(params.map(|Path(params)| params).unwrap_or_default());

    let outcome = state.cache.lookup(&incoming, &ResponseHeaders::new()).await;
    if let Some(hit) = outcome.response {
        return Err(into_response(hit));
    }

    let context = CacheContext {
        request: incoming,
        state: outcome.state,
    };
    Ok((Request::from_parts(parts, Body::from(bytes)), context))
}

/// Run the store stage on a produced response
async fn finish(state: &CacheMiddlewareState, context: CacheContext, response: Response) -> Response {
    if !context.state.needs_cache {
        return response;
    }

    let (parts, body) = response.into_parts();
    let fits = body
        .size_hint()
        .upper()
        .is_some_and(|upper| upper <= state.max_body_bytes as u64);
    if !fits {
        debug!(
            uri = %context.request.uri,
            limit = state.max_body_bytes,
            "Response body is too large or unbounded, not caching"
        );
        return Response::from_parts(parts, body);
    }

    let bytes = match to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return CacheError::write(format!("Failed to buffer response body: {}", e)).into_response()
        }
    };

    let Some(produced) = from_parts(&parts, &bytes) else {
        debug!(uri = %context.request.uri, "Response body is not JSON, not caching");
        return Response::from_parts(parts, Body::from(bytes));
    };

    match state.cache.store(&context.request, &context.state, produced).await {
        Ok(stored) => into_response(stored),
        Err(err) => err.into_response(),
    }
}

/// Produced response as a [`CachedResponse`]; `None` when the body is not JSON
pub fn from_parts(parts: &Parts, body: &Bytes) -> Option<CachedResponse> {
    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(body).ok()?
    };

    let headers = parts
        .headers
        .keys()
        .filter(|name| !HOP_HEADERS.contains(&name.as_str()))
        .filter_map(|name| {
            let values: Vec<&str> = parts
                .headers
                .get_all(name)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .collect();
            if values.is_empty() {
                return None;
            }
            let joined = values.join(HEADER_VALUE_SEPARATOR);
            Some((name.as_str().to_string(), joined))
        })
        .collect();

    Some(CachedResponse::new(parts.status.as_u16(), headers, body))
}

/// Render a [`CachedResponse`] as a JSON response
pub fn into_response(cached: CachedResponse) -> Response {
    let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
    let body = match serde_json::to_vec(&cached.body) {
        Ok(body) => body,
        Err(e) => return CacheError::from(e).into_response(),
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in &cached.headers {
        if HOP_HEADERS.contains(&name.as_str()) {
            continue;
        }
        let Ok(header_name) = HeaderName::try_from(name.as_str()) else {
            warn!(header = %name, "Skipping invalid cached header");
            continue;
        };
        for part in value.split(HEADER_VALUE_SEPARATOR) {
            match HeaderValue::from_str(part) {
                Ok(part) => {
                    headers.append(header_name.clone(), part);
                }
                Err(_) => warn!(header = %name, "Skipping invalid cached header value"),
            }
        }
    }
    headers
        .entry(header::CONTENT_TYPE)
        .or_insert(HeaderValue::from_static("application/json"));

    response
}

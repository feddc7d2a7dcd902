//! # Cached Envelope
//!
//! The persisted unit is `{headers, status, body}` encoded as JSON, where the
//! body object carries a nested `cache` object:
//!
//! ```json
//! {
//!   "headers": {"content-type": "application/json"},
//!   "status": 200,
//!   "body": {
//!     "items": [],
//!     "cache": {
//!       "time": "2024-05-01T10:00:00.000Z",
//!       "timestamp": "1714557600000",
//!       "cacheExpiration": 1714557900000
//!     }
//!   }
//! }
//! ```
//!
//! `cacheExpiration` is an absolute epoch-millisecond instant. Entries are
//! never deleted; staleness is checked at read time.

use crate::core::error::CacheResult;
use crate::core::types::{CachedResponse, ResponseHeaders};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Name of the metadata object inside the body
pub const CACHE_FIELD: &str = "cache";

/// Key under which non-object bodies are wrapped before stamping
pub const WRAPPED_BODY_FIELD: &str = "data";

/// Metadata stamped into every stored body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// RFC 3339 UTC time the response was stamped
    pub time: String,

    /// Epoch milliseconds of the same instant, as a string
    pub timestamp: String,

    /// Absolute expiry, epoch milliseconds
    #[serde(rename = "cacheExpiration")]
    pub cache_expiration: i64,
}

impl CacheMetadata {
    pub fn new(now: DateTime<Utc>, expire: Duration) -> Self {
        let now_ms = now.timestamp_millis();
        Self {
            time: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            timestamp: now_ms.to_string(),
            cache_expiration: now_ms.saturating_add(expire.as_millis() as i64),
        }
    }

    /// Fill in whichever metadata fields the body does not already carry.
    ///
    /// A null body becomes an empty object; any other non-object body is
    /// wrapped as `{"data": <body>}` so it can hold the `cache` object.
    pub fn stamp(&self, body: &mut Value) {
        if body.is_null() {
            *body = Value::Object(Map::new());
        } else if !body.is_object() {
            let mut wrapped = Map::new();
            wrapped.insert(WRAPPED_BODY_FIELD.to_string(), body.take());
            *body = Value::Object(wrapped);
        }

        let Value::Object(object) = body else {
            return;
        };

        let cache = object
            .entry(CACHE_FIELD)
            .or_insert_with(|| Value::Object(Map::new()));
        if !cache.is_object() {
            *cache = Value::Object(Map::new());
        }

        if let Value::Object(existing) = cache {
            existing
                .entry("time")
                .or_insert_with(|| Value::String(self.time.clone()));
            existing
                .entry("timestamp")
                .or_insert_with(|| Value::String(self.timestamp.clone()));
            existing
                .entry("cacheExpiration")
                .or_insert_with(|| Value::from(self.cache_expiration));
        }
    }
}

/// The unit written to and read from the cache engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEnvelope {
    #[serde(default)]
    pub headers: ResponseHeaders,

    #[serde(default)]
    pub status: u16,

    #[serde(default)]
    pub body: Value,
}

impl CachedEnvelope {
    pub fn from_json(raw: &str) -> CacheResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> CacheResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Absolute expiry recorded in `body.cache.cacheExpiration`, if any.
    /// Integer, float and numeric-string encodings are accepted.
    pub fn expiration(&self) -> Option<i64> {
        let value = self.body.get(CACHE_FIELD)?.get("cacheExpiration")?;
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|ms| ms as i64))
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
    }

    /// Response to serve on a hit; `local` headers win over cached ones
    pub fn to_response(&self, local: &ResponseHeaders) -> CachedResponse {
        CachedResponse::new(
            self.status,
            CachedResponse::merge_headers(&self.headers, local),
            self.body.clone(),
        )
    }
}

impl From<CachedResponse> for CachedEnvelope {
    fn from(response: CachedResponse) -> Self {
        Self {
            headers: response.headers,
            status: response.status,
            body: response.body,
        }
    }
}

//! # Core Request/Response Types
//!
//! Framework-neutral views of the request being cached and of the response
//! being produced. The cache stages work on these values instead of mutating a
//! host framework's response object; the axum adapter converts at the edges.

use axum::http::{HeaderMap, Method, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Response headers, lower-cased name to value, ordered for stable encoding
pub type ResponseHeaders = BTreeMap<String, String>;

/// An inbound request as seen by the cache
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    /// HTTP method
    pub method: Method,

    /// Request target as received (path and query)
    pub uri: Uri,

    /// Request headers
    pub headers: HeaderMap,

    /// Raw request body
    pub body: Vec<u8>,

    /// Route parameters extracted by the host router
    pub params: BTreeMap<String, String>,
}

impl IncomingRequest {
    /// Create a request without route parameters
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
            params: BTreeMap::new(),
        }
    }

    /// Attach route parameters
    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params = params
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Request path without the query string
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Raw query string, if any
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// First value of a header as UTF-8, if present and valid
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Decoded query parameters; repeated names keep every value in order
    pub fn query_params(&self) -> BTreeMap<String, Vec<String>> {
        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        if let Some(query) = self.query() {
            for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
                params.entry(name.into_owned()).or_default().push(value.into_owned());
            }
        }
        params
    }

    /// Body as JSON: `null` when empty, parsed JSON when valid, otherwise a
    /// lossily-decoded string
    pub fn body_value(&self) -> Value {
        if self.body.is_empty() {
            return Value::Null;
        }
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&self.body).into_owned()))
    }
}

/// A response produced by application logic or served from the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: ResponseHeaders,
    pub body: Value,
}

impl Default for CachedResponse {
    fn default() -> Self {
        Self {
            status: StatusCode::OK.as_u16(),
            headers: ResponseHeaders::new(),
            body: Value::Object(serde_json::Map::new()),
        }
    }
}

impl CachedResponse {
    pub fn new(status: u16, headers: ResponseHeaders, body: Value) -> Self {
        Self { status, headers, body }
    }

    /// JSON response with no headers set yet
    pub fn json(status: StatusCode, body: Value) -> Self {
        Self::new(status.as_u16(), ResponseHeaders::new(), body)
    }

    /// Set a header, lower-casing its name
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Combine cached headers with headers already set on the outgoing
    /// response. Locally-set headers win on conflict.
    pub fn merge_headers(cached: &ResponseHeaders, local: &ResponseHeaders) -> ResponseHeaders {
        let mut merged = cached.clone();
        for (name, value) in local {
            merged.insert(name.clone(), value.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(uri: &str, body: &[u8]) -> IncomingRequest {
        IncomingRequest::new(Method::GET, uri.parse().unwrap(), HeaderMap::new(), body.to_vec())
    }

    #[test]
    fn test_query_params_keep_repeats() {
        let req = request("/items?tag=a&tag=b&page=2&q=hello%20world", b"");
        let params = req.query_params();

        assert_eq!(params["tag"], vec!["a", "b"]);
        assert_eq!(params["page"], vec!["2"]);
        assert_eq!(params["q"], vec!["hello world"]);
        assert_eq!(req.path(), "/items");
    }

    #[test]
    fn test_body_value_variants() {
        assert_eq!(request("/", b"").body_value(), Value::Null);
        assert_eq!(request("/", br#"{"a":1}"#).body_value(), json!({"a": 1}));
        assert_eq!(request("/", b"plain text").body_value(), json!("plain text"));
    }

    #[test]
    fn test_merge_headers_local_wins() {
        let mut cached = ResponseHeaders::new();
        cached.insert("content-type".to_string(), "application/json".to_string());
        cached.insert("x-origin".to_string(), "cache".to_string());

        let mut local = ResponseHeaders::new();
        local.insert("x-origin".to_string(), "local".to_string());
        local.insert("x-request-id".to_string(), "abc".to_string());

        let merged = CachedResponse::merge_headers(&cached, &local);
        assert_eq!(merged["content-type"], "application/json");
        assert_eq!(merged["x-origin"], "local");
        assert_eq!(merged["x-request-id"], "abc");
    }

    #[test]
    fn test_with_header_lowercases() {
        let response = CachedResponse::json(StatusCode::OK, json!({})).with_header("X-Trace", "1");
        assert_eq!(response.headers.get("x-trace").map(String::as_str), Some("1"));
    }
}

//! # Cache Key Derivation
//!
//! A cache key is a structured description of a request rather than a
//! formatted string. Engines decide how to turn it into a storage field;
//! [`CacheKey::field`] gives them a canonical encoding where identical logical
//! requests always produce identical bytes.

use crate::core::config::ResponseCacheConfig;
use crate::core::error::CacheResult;
use crate::core::types::IncomingRequest;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Structured cache key of a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey {
    /// Request target as received
    pub url: String,

    /// Request body as JSON (`null` when empty)
    pub body: Value,

    /// Route parameters
    pub params: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<BTreeMap<String, Vec<String>>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

impl CacheKey {
    /// Canonical JSON encoding. Maps are ordered and absent fields are
    /// omitted, so equal keys always encode to equal strings.
    pub fn field(&self) -> CacheResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// SHA-256 of the canonical encoding, hex encoded
    pub fn digest(&self) -> CacheResult<String> {
        let mut hasher = Sha256::new();
        hasher.update(self.field()?.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    /// Canonical encoding, or `hash:<digest>` when it exceeds `max_length`
    pub fn bounded_field(&self, max_length: usize) -> CacheResult<String> {
        let field = self.field()?;
        if field.len() <= max_length {
            return Ok(field);
        }
        Ok(format!("hash:{}", self.digest()?))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.method {
            Some(method) => write!(f, "{} {}", method, self.url),
            None => write!(f, "{}", self.url),
        }
    }
}

/// Turns requests into [`CacheKey`]s according to the ignore flags
#[derive(Debug, Clone)]
pub struct KeyDeriver {
    ignore_headers: bool,
    ignore_method: bool,
    ignore_query: bool,
    excluded_headers: HashSet<String>,
}

impl KeyDeriver {
    pub fn new(config: &ResponseCacheConfig) -> Self {
        Self {
            ignore_headers: config.ignore_headers,
            ignore_method: config.ignore_method,
            ignore_query: config.ignore_query,
            excluded_headers: config
                .excluded_headers
                .iter()
                .map(|name| name.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Derive the key of a request. Pure and infallible.
    pub fn derive(&self, request: &IncomingRequest) -> CacheKey {
        CacheKey {
            url: request.uri.to_string(),
            body: request.body_value(),
            params: request.params.clone(),
            method: (!self.ignore_method).then(|| request.method.to_string()),
            query: (!self.ignore_query).then(|| request.query_params()),
            headers: (!self.ignore_headers).then(|| self.key_headers(&request.headers)),
        }
    }

    /// Request headers minus the excluded ones; repeated headers are joined
    fn key_headers(&self, headers: &HeaderMap) -> BTreeMap<String, String> {
        headers
            .keys()
            .filter(|name| !self.excluded_headers.contains(name.as_str()))
            .map(|name| {
                let value = headers
                    .get_all(name)
                    .iter()
                    .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                    .collect::<Vec<_>>()
                    .join(", ");
                (name.as_str().to_string(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ConfigOverrides;
    use axum::http::Method;
    use serde_json::json;

    fn create_test_request() -> IncomingRequest {
        let mut headers = HeaderMap::new();
        headers.insert("etag", "2c94a7fe10e29b34c5cc7181".parse().unwrap());
        headers.insert("if-modified-since", "2018-01-01T12:00:00Z".parse().unwrap());
        headers.insert("lame", "lamer".parse().unwrap());

        IncomingRequest::new(
            Method::GET,
            "/api/users/123?sort=name".parse().unwrap(),
            headers,
            Vec::new(),
        )
        .with_params([("id", "123")])
    }

    fn deriver(overrides: ConfigOverrides) -> KeyDeriver {
        KeyDeriver::new(&ResponseCacheConfig::with_overrides(&overrides))
    }

    #[test]
    fn test_full_key() {
        let key = deriver(ConfigOverrides::new()).derive(&create_test_request());

        assert_eq!(key.url, "/api/users/123?sort=name");
        assert_eq!(key.body, Value::Null);
        assert_eq!(key.params.get("id").map(String::as_str), Some("123"));
        assert_eq!(key.method.as_deref(), Some("GET"));
        assert_eq!(key.query.as_ref().unwrap()["sort"], vec!["name"]);

        let headers = key.headers.unwrap();
        assert_eq!(headers.get("lame").map(String::as_str), Some("lamer"));
        assert!(!headers.contains_key("etag"));
        assert!(!headers.contains_key("if-modified-since"));
    }

    #[test]
    fn test_ignore_headers() {
        let key = deriver(ConfigOverrides::new().ignore_headers(true)).derive(&create_test_request());
        assert!(key.headers.is_none());
        assert!(key.method.is_some());
        assert!(key.query.is_some());
    }

    #[test]
    fn test_ignore_method() {
        let key = deriver(ConfigOverrides::new().ignore_method(true)).derive(&create_test_request());
        assert!(key.method.is_none());
        assert!(key.headers.is_some());
        assert!(key.query.is_some());
    }

    #[test]
    fn test_ignore_query() {
        let key = deriver(ConfigOverrides::new().ignore_query(true)).derive(&create_test_request());
        assert!(key.query.is_none());
        assert!(key.headers.is_some());
        assert!(key.method.is_some());
    }

    #[test]
    fn test_absent_fields_not_encoded() {
        let key = deriver(
            ConfigOverrides::new()
                .ignore_headers(true)
                .ignore_method(true)
                .ignore_query(true),
        )
        .derive(&create_test_request());

        let encoded: Value = serde_json::from_str(&key.field().unwrap()).unwrap();
        let object = encoded.as_object().unwrap();
        assert!(object.contains_key("url"));
        assert!(object.contains_key("body"));
        assert!(object.contains_key("params"));
        assert!(!object.contains_key("method"));
        assert!(!object.contains_key("query"));
        assert!(!object.contains_key("headers"));
    }

    #[test]
    fn test_derivation_is_idempotent() {
        let deriver = deriver(ConfigOverrides::new());
        let request = create_test_request();

        let first = deriver.derive(&request);
        let second = deriver.derive(&request);
        assert_eq!(first, second);
        assert_eq!(first.field().unwrap(), second.field().unwrap());
    }

    #[test]
    fn test_header_order_does_not_matter() {
        let mut a = HeaderMap::new();
        a.insert("accept", "application/json".parse().unwrap());
        a.insert("x-tenant", "acme".parse().unwrap());

        let mut b = HeaderMap::new();
        b.insert("x-tenant", "acme".parse().unwrap());
        b.insert("accept", "application/json".parse().unwrap());

        let deriver = deriver(ConfigOverrides::new());
        let key_a = deriver.derive(&IncomingRequest::new(Method::GET, "/".parse().unwrap(), a, Vec::new()));
        let key_b = deriver.derive(&IncomingRequest::new(Method::GET, "/".parse().unwrap(), b, Vec::new()));
        assert_eq!(key_a.field().unwrap(), key_b.field().unwrap());
    }

    #[test]
    fn test_custom_excluded_headers() {
        let key = deriver(ConfigOverrides::new().excluded_headers(["Lame"])).derive(&create_test_request());
        let headers = key.headers.unwrap();
        assert!(!headers.contains_key("lame"));
        assert!(headers.contains_key("etag"));
    }

    #[test]
    fn test_json_body_in_key() {
        let request = IncomingRequest::new(
            Method::GET,
            "/search".parse().unwrap(),
            HeaderMap::new(),
            br#"{"term":"rust","page":1}"#.to_vec(),
        );
        let key = deriver(ConfigOverrides::new()).derive(&request);
        assert_eq!(key.body, json!({"term": "rust", "page": 1}));
    }

    #[test]
    fn test_bounded_field() {
        let key = deriver(ConfigOverrides::new()).derive(&create_test_request());

        let short = key.bounded_field(10_000).unwrap();
        assert_eq!(short, key.field().unwrap());

        let hashed = key.bounded_field(10).unwrap();
        assert!(hashed.starts_with("hash:"));
        assert_eq!(hashed.len(), 69); // "hash:" + 64 hex chars
        assert_eq!(&hashed[5..], key.digest().unwrap());
    }
}

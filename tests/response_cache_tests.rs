//! # Response Cache Integration Tests
//!
//! End-to-end behaviour of the lookup and store stages through the public API:
//! - hit/miss/bypass decisions
//! - expiry with a manual clock
//! - construction errors
//! - configuration files driving a cache

use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use response_cache::caching::{
    CacheSource, Decision, InMemoryObjectCache, ObjectCache, ResponseCache,
};
use response_cache::core::clock::ManualClock;
use response_cache::core::config::{ConfigOverrides, ServiceConfig};
use response_cache::core::types::{CachedResponse, IncomingRequest, ResponseHeaders};
use response_cache::CacheError;
use serde_json::json;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Test Utilities
// ============================================================================

fn create_test_request(method: Method, uri: &str, headers: Option<HeaderMap>) -> IncomingRequest {
    IncomingRequest::new(method, uri.parse().unwrap(), headers.unwrap_or_default(), Vec::new())
}

async fn create_test_cache(clock: Arc<ManualClock>) -> ResponseCache {
    ResponseCache::builder("test")
        .overrides(ConfigOverrides::new().expire(Duration::from_millis(10)))
        .clock(clock)
        .build()
        .await
        .unwrap()
}

// ============================================================================
// Lookup / Store
// ============================================================================

#[tokio::test]
async fn test_scenario_hit_then_expire() {
    let clock = Arc::new(ManualClock::starting_now());
    let cache = create_test_cache(clock.clone()).await;
    let request = create_test_request(Method::GET, "/", None);

    let first = cache.lookup(&request, &ResponseHeaders::new()).await;
    assert_eq!(first.decision, Decision::MissEmpty);
    assert!(first.state.needs_cache);
    assert!(!first.state.used_cache);

    let produced = CachedResponse::json(StatusCode::OK, json!({"greeting": "hello"}));
    let stored = cache.store(&request, &first.state, produced).await.unwrap();
    assert!(stored.body["cache"]["time"].is_string());

    let second = cache.lookup(&request, &ResponseHeaders::new()).await;
    assert_eq!(second.decision, Decision::Hit);
    assert!(second.state.used_cache);
    assert_eq!(second.response.unwrap().body, stored.body);

    clock.advance(Duration::from_millis(20));

    let third = cache.lookup(&request, &ResponseHeaders::new()).await;
    assert_eq!(third.decision, Decision::MissExpired);
    assert!(third.state.needs_cache);
    assert!(!third.state.used_cache);
}

#[tokio::test]
async fn test_refresh_after_expiry() {
    let clock = Arc::new(ManualClock::new(10_000));
    let cache = create_test_cache(clock.clone()).await;
    let request = create_test_request(Method::GET, "/refresh", None);

    let first = cache.lookup(&request, &ResponseHeaders::new()).await;
    cache
        .store(&request, &first.state, CachedResponse::json(StatusCode::OK, json!({"v": 1})))
        .await
        .unwrap();

    clock.advance(Duration::from_millis(10));
    let expired = cache.lookup(&request, &ResponseHeaders::new()).await;
    assert_eq!(expired.decision, Decision::MissExpired);

    cache
        .store(&request, &expired.state, CachedResponse::json(StatusCode::OK, json!({"v": 2})))
        .await
        .unwrap();

    let refreshed = cache.lookup(&request, &ResponseHeaders::new()).await;
    assert_eq!(refreshed.decision, Decision::Hit);
    assert_eq!(refreshed.response.unwrap().body["v"], json!(2));
}

#[tokio::test]
async fn test_no_cache_request_after_store() {
    let cache = create_test_cache(Arc::new(ManualClock::new(0))).await;
    let request = create_test_request(Method::GET, "/fresh", None);

    let first = cache.lookup(&request, &ResponseHeaders::new()).await;
    cache
        .store(&request, &first.state, CachedResponse::default())
        .await
        .unwrap();

    let mut headers = HeaderMap::new();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    let bypass = create_test_request(Method::GET, "/fresh", Some(headers));

    let outcome = cache.lookup(&bypass, &ResponseHeaders::new()).await;
    assert_eq!(outcome.decision, Decision::BypassNoCacheHeader);
    assert!(!outcome.state.needs_cache);
    assert!(outcome.response.is_none());
}

#[tokio::test]
async fn test_key_flags_change_sharing() {
    let clock = Arc::new(ManualClock::new(0));

    let strict = ResponseCache::builder("strict").clock(clock.clone()).build().await.unwrap();
    let lenient = ResponseCache::builder("lenient")
        .overrides(ConfigOverrides::new().ignore_headers(true).ignore_query(true))
        .clock(clock.clone())
        .build()
        .await
        .unwrap();

    let mut headers = HeaderMap::new();
    headers.insert("x-tenant", HeaderValue::from_static("acme"));
    let with_tenant = create_test_request(Method::GET, "/list?sort=asc", Some(headers));

    // The url still carries the query, so only the header flag matters here
    let plain = create_test_request(Method::GET, "/list?sort=asc", None);

    for cache in [&strict, &lenient] {
        let first = cache.lookup(&with_tenant, &ResponseHeaders::new()).await;
        cache
            .store(&with_tenant, &first.state, CachedResponse::default())
            .await
            .unwrap();
    }

    assert_eq!(
        strict.lookup(&plain, &ResponseHeaders::new()).await.decision,
        Decision::MissEmpty
    );
    assert_eq!(
        lenient.lookup(&plain, &ResponseHeaders::new()).await.decision,
        Decision::Hit
    );
}

#[tokio::test]
async fn test_validation_headers_do_not_split_entries() {
    let cache = create_test_cache(Arc::new(ManualClock::new(0))).await;

    let mut first_headers = HeaderMap::new();
    first_headers.insert("if-none-match", HeaderValue::from_static("\"abc\""));
    let first = create_test_request(Method::GET, "/etag", Some(first_headers));

    let mut second_headers = HeaderMap::new();
    second_headers.insert("if-none-match", HeaderValue::from_static("\"def\""));
    let second = create_test_request(Method::GET, "/etag", Some(second_headers));

    let outcome = cache.lookup(&first, &ResponseHeaders::new()).await;
    cache
        .store(&first, &outcome.state, CachedResponse::default())
        .await
        .unwrap();

    assert_eq!(
        cache.lookup(&second, &ResponseHeaders::new()).await.decision,
        Decision::Hit
    );
}

#[tokio::test]
async fn test_shared_engine_namespaces() {
    let engine: Arc<dyn ObjectCache> = Arc::new(InMemoryObjectCache::default());
    let clock = Arc::new(ManualClock::new(0));

    let users = ResponseCache::builder("users")
        .cache(engine.clone())
        .clock(clock.clone())
        .build()
        .await
        .unwrap();
    let orders = ResponseCache::builder("orders")
        .cache(engine.clone())
        .clock(clock.clone())
        .build()
        .await
        .unwrap();

    let request = create_test_request(Method::GET, "/same", None);
    let outcome = users.lookup(&request, &ResponseHeaders::new()).await;
    users
        .store(&request, &outcome.state, CachedResponse::default())
        .await
        .unwrap();

    assert_eq!(users.lookup(&request, &ResponseHeaders::new()).await.decision, Decision::Hit);
    assert_eq!(orders.lookup(&request, &ResponseHeaders::new()).await.decision, Decision::MissEmpty);
    assert_eq!(engine.stats().await.unwrap().entries, Some(1));
}

#[tokio::test]
async fn test_observer_receives_response_and_envelope_on_hit() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let misses = Arc::new(AtomicUsize::new(0));

    let cache = {
        let seen = seen.clone();
        let misses = misses.clone();
        ResponseCache::builder("observed")
            .clock(Arc::new(ManualClock::new(0)))
            .on_cache_hit(move |request, response, envelope| {
                assert!(response.body.get("cache").is_some());
                seen.lock()
                    .unwrap()
                    .push((request.uri.to_string(), response.status, envelope.status));
            })
            .on_cache_miss(move |_, _| {
                misses.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .await
            .unwrap()
    };

    let request = create_test_request(Method::GET, "/observed", None);
    let outcome = cache.lookup(&request, &ResponseHeaders::new()).await;
    cache
        .store(
            &request,
            &outcome.state,
            CachedResponse::json(StatusCode::ACCEPTED, json!({})),
        )
        .await
        .unwrap();
    cache.lookup(&request, &ResponseHeaders::new()).await;

    assert_eq!(misses.load(Ordering::SeqCst), 1);
    assert_eq!(*seen.lock().unwrap(), vec![("/observed".to_string(), 202, 202)]);
}

// ============================================================================
// Construction
// ============================================================================

#[tokio::test]
async fn test_plain_string_cache_argument_rejected() {
    let result = ResponseCache::new("test", ConfigOverrides::new(), Some(CacheSource::from("lame"))).await;
    match result {
        Err(CacheError::Configuration { message }) => {
            assert!(message.contains("Unsupported cache argument"));
        }
        other => panic!("expected a configuration error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_memory_url_cache_argument() {
    let cache = ResponseCache::new("test", ConfigOverrides::new(), Some(CacheSource::from("memory://")))
        .await
        .unwrap();
    assert_eq!(cache.engine().name(), "memory");
}

#[tokio::test]
async fn test_empty_namespace_rejected() {
    let result = ResponseCache::new("", ConfigOverrides::new(), None).await;
    assert!(matches!(result, Err(CacheError::Configuration { .. })));
}

#[tokio::test]
async fn test_cache_from_config_file() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(
        file,
        r#"
namespace: catalog
backend: "memory://"
cache:
  expire: 2s
  ignore_headers: true
"#
    )
    .unwrap();

    let config = ServiceConfig::load_from_file(file.path()).await.unwrap();
    let cache = ResponseCache::new(
        config.namespace.clone(),
        config.cache.clone(),
        Some(CacheSource::from(config.backend.clone())),
    )
    .await
    .unwrap();

    assert_eq!(cache.namespace(), "catalog");
    assert_eq!(cache.config().expire, Duration::from_secs(2));
    assert!(cache.config().ignore_headers);
    assert!(!cache.config().ignore_query);
}

#[tokio::test]
#[ignore] // Requires a running Redis server
async fn test_redis_round_trip() {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let namespace = format!("it-{}", chrono::Utc::now().timestamp_millis());

    let cache = ResponseCache::new(namespace, ConfigOverrides::new(), Some(CacheSource::from(url)))
        .await
        .unwrap();
    assert_eq!(cache.engine().name(), "redis");

    let request = create_test_request(Method::GET, "/redis", None);
    let outcome = cache.lookup(&request, &ResponseHeaders::new()).await;
    assert_eq!(outcome.decision, Decision::MissEmpty);

    cache
        .store(&request, &outcome.state, CachedResponse::json(StatusCode::OK, json!({"r": 1})))
        .await
        .unwrap();

    let hit = cache.lookup(&request, &ResponseHeaders::new()).await;
    assert_eq!(hit.decision, Decision::Hit);
    assert_eq!(hit.response.unwrap().body["r"], json!(1));
}

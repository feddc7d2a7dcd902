//! # Cache Metrics
//!
//! Counters and histograms emitted by the response cache through the
//! `metrics` facade. Nothing is recorded until a recorder is installed; the
//! service binary installs the Prometheus exporter with [`install_prometheus`].
//!
//! | Metric | Kind | Labels |
//! |--------|------|--------|
//! | `response_cache_lookups_total` | counter | `namespace`, `decision` |
//! | `response_cache_lookup_duration_seconds` | histogram | `namespace` |
//! | `response_cache_stores_total` | counter | `namespace` |
//! | `response_cache_store_errors_total` | counter | `namespace` |

use crate::caching::middleware::Decision;
use crate::core::error::{CacheError, CacheResult};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

pub const LOOKUPS_TOTAL: &str = "response_cache_lookups_total";
pub const LOOKUP_DURATION_SECONDS: &str = "response_cache_lookup_duration_seconds";
pub const STORES_TOTAL: &str = "response_cache_stores_total";
pub const STORE_ERRORS_TOTAL: &str = "response_cache_store_errors_total";

/// Lookup latency buckets, in seconds
const LOOKUP_BUCKETS: [f64; 10] = [
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0,
];

/// Record the outcome and latency of one lookup
pub fn record_lookup(namespace: &str, decision: Decision, elapsed: Duration) {
    metrics::counter!(
        LOOKUPS_TOTAL,
        "namespace" => namespace.to_string(),
        "decision" => decision.as_str()
    )
    .increment(1);

    metrics::histogram!(LOOKUP_DURATION_SECONDS, "namespace" => namespace.to_string())
        .record(elapsed.as_secs_f64());
}

/// Record one envelope write, successful or not
pub fn record_store(namespace: &str, succeeded: bool) {
    if succeeded {
        metrics::counter!(STORES_TOTAL, "namespace" => namespace.to_string()).increment(1);
    } else {
        metrics::counter!(STORE_ERRORS_TOTAL, "namespace" => namespace.to_string()).increment(1);
    }
}

/// Install the global Prometheus recorder and return a handle for rendering
pub fn install_prometheus() -> CacheResult<PrometheusHandle> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(LOOKUP_DURATION_SECONDS.to_string()),
            &LOOKUP_BUCKETS,
        )
        .map_err(|e| CacheError::config(format!("Failed to set histogram buckets: {}", e)))?
        .install_recorder()
        .map_err(|e| CacheError::config(format!("Failed to install metrics recorder: {}", e)))
}

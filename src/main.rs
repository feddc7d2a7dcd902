//! # Response Cache - Demo Service
//!
//! Serves a couple of JSON routes through the cache middleware, plus
//! `/health` and `/metrics`.
//!
//! The configuration file path is taken from the first argument or from
//! `RESPONSE_CACHE_CONFIG`; without one, defaults and `RESPONSE_CACHE_*`
//! environment variables are used.

use anyhow::Context;
use axum::{
    extract::{Path, State},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use response_cache::caching::{CacheSource, ResponseCache};
use response_cache::core::config::ServiceConfig;
use response_cache::middleware::{cache_layer, CacheMiddlewareState};
use response_cache::observability::{init_logging, install_prometheus};
use response_cache::CacheError;

#[derive(Clone)]
struct AppState {
    cache: Arc<ResponseCache>,
    metrics: Option<PrometheusHandle>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().await?;

    init_logging(&config.logging).context("failed to initialize logging")?;

    info!("Starting response-cache");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let metrics = if config.metrics_enabled {
        Some(install_prometheus().context("failed to install metrics exporter")?)
    } else {
        None
    };

    let cache = ResponseCache::new(
        config.namespace.clone(),
        config.cache.clone(),
        Some(CacheSource::from(config.backend.clone())),
    )
    .await
    .context("failed to create response cache")?;

    let cache_state = CacheMiddlewareState::new(cache).with_max_body_bytes(config.server.max_body_bytes);
    let app_state = AppState {
        cache: cache_state.cache.clone(),
        metrics,
    };

    let cached_routes = Router::new()
        .route("/api/time", get(current_time))
        .route("/api/items/:id", get(get_item))
        .layer(middleware::from_fn_with_state(cache_state, cache_layer));

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .with_state(app_state)
        .merge(cached_routes);

    let address = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;

    info!(address = %address, namespace = %config.namespace, backend = %config.backend, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn load_config() -> anyhow::Result<ServiceConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("RESPONSE_CACHE_CONFIG").ok());

    let config = match path {
        Some(path) => ServiceConfig::load_from_file(&path)
            .await
            .with_context(|| format!("failed to load {}", path))?,
        None => {
            let mut config = ServiceConfig::default();
            config.apply_env_overrides()?;
            config.validate()?;
            config
        }
    };
    Ok(config)
}

/// Sample route: a value that visibly changes between uncached calls
async fn current_time() -> Json<Value> {
    let now = Utc::now();
    Json(json!({
        "now": now.to_rfc3339(),
        "epochMillis": now.timestamp_millis(),
    }))
}

/// Sample route with a path parameter
async fn get_item(Path(id): Path<String>) -> Json<Value> {
    Json(json!({
        "id": id,
        "generatedAt": Utc::now().to_rfc3339(),
    }))
}

async fn health(State(state): State<AppState>) -> Response {
    let healthy = match state.cache.health_check().await {
        Ok(healthy) => healthy,
        Err(err) => return err.into_response(),
    };
    let stats = match state.cache.stats().await {
        Ok(stats) => stats,
        Err(err) => return err.into_response(),
    };

    Json(json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "namespace": state.cache.namespace(),
        "engine": state.cache.engine().name(),
        "stats": stats,
    }))
    .into_response()
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => CacheError::config("metrics are disabled").into_response(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

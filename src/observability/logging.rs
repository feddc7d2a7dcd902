//! # Structured Logging
//!
//! Installs the global `tracing` subscriber: an `EnvFilter` seeded from
//! `RUST_LOG` plus the configured level, and a JSON or plain-text `fmt` layer.

use tracing::{warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::core::error::CacheResult;
use crate::observability::config::{LogConfig, LogFormat};

/// Parse a level name; unknown names fall back to `info`
fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Build the filter used by [`init_logging`]
pub fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::from_default_env().add_directive(parse_level(&config.level).into())
}

/// Install the global subscriber.
///
/// Calling this twice is not an error; the second call logs a warning and
/// leaves the first subscriber in place.
pub fn init_logging(config: &LogConfig) -> CacheResult<()> {
    let env_filter = env_filter(config);

    let result = match config.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(env_filter)
            .with(fmt::layer().with_target(true))
            .try_init(),
    };

    if result.is_err() {
        warn!("Tracing subscriber already initialized, skipping initialization");
    }

    Ok(())
}

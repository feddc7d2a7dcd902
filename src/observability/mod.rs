//! Logging and metrics for the response cache.

// Logging configuration
pub mod config;

// Subscriber installation
pub mod logging;

// Cache counters and the Prometheus exporter
pub mod metrics;

pub use config::{LogConfig, LogFormat};
pub use logging::init_logging;
pub use metrics::install_prometheus;

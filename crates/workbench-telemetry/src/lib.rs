//! # Workbench Telemetry
//!
//! Observability setup for the workbench tool bus.
//!
//! ## Components
//!
//! - **Logs**: `tracing` subscriber with pretty or JSON output
//! - **Metrics**: per-bus Prometheus registry ([`BusMetrics`])
//!
//! ## Usage
//!
//! ```rust,ignore
//! use workbench_telemetry::{TelemetryConfig, init_telemetry};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     let _guard = init_telemetry(&config).expect("Failed to init telemetry");
//!     // Application code here
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `workbench` | Service name in logs |
//! | `WB_PROJECT_ID` | `default` | Project identifier |
//! | `WB_LOG_LEVEL` | `info` | Log level filter |
//! | `WB_JSON_LOGS` | `false` | JSON log output |
//! | `WB_METRICS_NAMESPACE` | `workbench` | Metric name prefix |

mod config;
mod logging;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{BusMetrics, HistogramTimer};
pub use tracing_setup::{init_tracing, TracingGuard};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracerInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging for the process.
///
/// Returns a guard that must be held for the lifetime of the application.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    if config.metrics_namespace.is_empty()
        || !config
            .metrics_namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(TelemetryError::Config(format!(
            "metrics namespace {:?} must be non-empty [A-Za-z0-9_]",
            config.metrics_namespace
        )));
    }

    let tracing_guard = init_tracing(config)?;

    Ok(TelemetryGuard {
        _tracing: tracing_guard,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _tracing: TracingGuard,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

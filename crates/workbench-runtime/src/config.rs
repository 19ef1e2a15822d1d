//! # Runtime Configuration
//!
//! Everything the composition root needs, read from the environment.
//!
//! - `WB_PROJECT_ID`: project the workbench is opened on (default: `default`)
//! - `WB_TOOL_CATALOG`: path to a JSON array of tool descriptors that replaces
//!   the built-in panel catalog
//! - `WB_KEEP_RUNNING`: wait for Ctrl+C after the demo session (default: false)
//! - `WB_BUS_*`: bus limits, see [`BusConfig::from_env`]
//! - `WB_LOG_LEVEL`, `WB_JSON_LOGS`, ...: see [`TelemetryConfig::from_env`]

use std::env;
use std::path::PathBuf;
use thiserror::Error;
use workbench_bus::{BusConfig, ConfigError};
use workbench_telemetry::TelemetryConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum RuntimeConfigError {
    #[error(transparent)]
    Bus(#[from] ConfigError),

    #[error("{var} must be true or false, got {value:?}")]
    InvalidFlag { var: &'static str, value: String },
}

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub project_id: String,
    /// Tool catalog override.
    pub catalog_path: Option<PathBuf>,
    pub keep_running: bool,
    pub bus: BusConfig,
    pub telemetry: TelemetryConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            project_id: "default".to_string(),
            catalog_path: None,
            keep_running: false,
            bus: BusConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, RuntimeConfigError> {
        let telemetry = TelemetryConfig::from_env();
        let mut bus = BusConfig::from_env()?;
        bus.metrics_namespace = telemetry.metrics_namespace.clone();

        Ok(Self {
            project_id: telemetry.project_id.clone(),
            catalog_path: env::var_os("WB_TOOL_CATALOG").map(PathBuf::from),
            keep_running: read_flag("WB_KEEP_RUNNING")?.unwrap_or(false),
            bus,
            telemetry,
        })
    }
}

fn read_flag(var: &'static str) -> Result<Option<bool>, RuntimeConfigError> {
    let Ok(value) = env::var(var) else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(Some(true)),
        "0" | "false" | "no" => Ok(Some(false)),
        _ => Err(RuntimeConfigError::InvalidFlag { var, value }),
    }
}

//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Project the workbench session is scoped to
    pub project_id: String,

    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Whether to enable console output (for development)
    pub console_output: bool,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,

    /// Prefix for every Prometheus metric name
    pub metrics_namespace: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "workbench".to_string(),
            project_id: "default".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            metrics_namespace: "workbench".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OTEL_SERVICE_NAME`: Service name (default: workbench)
    /// - `WB_PROJECT_ID`: Project identifier (default: default)
    /// - `WB_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `WB_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `WB_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    /// - `WB_METRICS_NAMESPACE`: Metric name prefix (default: workbench)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "workbench".to_string()),

            project_id: env::var("WB_PROJECT_ID").unwrap_or_else(|_| "default".to_string()),

            log_level: env::var("WB_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("WB_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),

            json_logs: env::var("WB_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),

            metrics_namespace: env::var("WB_METRICS_NAMESPACE")
                .unwrap_or_else(|_| "workbench".to_string()),
        }
    }

    /// Service name qualified by project.
    pub fn full_service_name(&self) -> String {
        if self.project_id == "default" {
            self.service_name.clone()
        } else {
            format!("{}-{}", self.service_name, self.project_id)
        }
    }
}

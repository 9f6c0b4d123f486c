//! Telemetry configuration from environment variables.

use serde::{Deserialize, Serialize};
use std::env;

/// Configuration of the logging subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name attached to the startup record
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive such as `nmr_core=debug,info`
    pub log_level: String,

    /// Whether to enable console output
    pub console_output: bool,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Whether to include thread names, useful to follow delivery threads
    pub thread_names: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "nmr".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            thread_names: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `NMR_SERVICE_NAME`: Service name (default: nmr)
    /// - `NMR_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `NMR_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `NMR_JSON_LOGS`: Enable JSON logs (default: false, true in containers)
    /// - `NMR_THREAD_NAMES`: Log thread names (default: false)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("NMR_SERVICE_NAME").unwrap_or_else(|_| "nmr".to_string()),

            log_level: env::var("NMR_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("NMR_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),

            json_logs: env::var("NMR_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),

            thread_names: env::var("NMR_THREAD_NAMES")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    /// Configuration for tests: debug level, no JSON.
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            service_name: "nmr-tests".to_string(),
            log_level: "debug".to_string(),
            thread_names: true,
            ..Self::default()
        }
    }
}

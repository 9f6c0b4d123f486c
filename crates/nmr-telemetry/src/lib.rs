//! # NMR Telemetry
//!
//! Logging bootstrap for the Normalized Message Router.
//!
//! The router crates only emit `tracing` events; this crate decides where
//! they go. Applications call [`init_telemetry`] once at startup and keep
//! the returned guard alive.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use nmr_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("Failed to init telemetry");
//!     // Router code here
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `NMR_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `NMR_JSON_LOGS` | `false` | JSON formatted output |
//! | `NMR_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `NMR_SERVICE_NAME` | `nmr` | Service name in the startup record |
//! | `NMR_THREAD_NAMES` | `false` | Include thread names |

mod config;
mod logging;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use tracing_setup::TracingGuard;

use std::sync::OnceLock;
use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("A global subscriber is already installed: {0}")]
    AlreadyInitialized(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging.
///
/// Returns a guard that must be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let tracing_guard = tracing_setup::init_tracing(&config)?;
    Ok(TelemetryGuard {
        _tracing: tracing_guard,
    })
}

/// Installs a test subscriber once per process; later calls are no-ops.
///
/// Honours `RUST_LOG`, and stays quiet unless `NMR_TEST_LOGS` is set.
pub fn init_test_telemetry() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let config = TelemetryConfig {
            console_output: std::env::var("NMR_TEST_LOGS").is_ok(),
            ..TelemetryConfig::for_tests()
        };
        if let Ok(guard) = tracing_setup::init_tracing(&config) {
            // The subscriber is process-global, so is its guard.
            std::mem::forget(guard);
        }
    });
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

//! Router configuration from environment variables.

use nmr_types::NmrError;
use serde::{Deserialize, Serialize};
use std::env;

/// Default number of threads available for asynchronous delivery.
pub const DEFAULT_EXECUTOR_THREADS: usize = 8;

/// Default thread name prefix of the delivery executor.
pub const DEFAULT_THREAD_NAME: &str = "nmr-delivery";

/// Configuration of an [`Nmr`](crate::Nmr) instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NmrConfig {
    /// Upper bound of concurrent asynchronous deliveries that no
    /// synchronous sender is waiting for.
    pub executor_threads: usize,

    /// Deliver every exchange on the dispatching thread.
    pub sync_delivery: bool,

    /// Consult the authorization registry while resolving targets.
    pub enforce_authorization: bool,

    /// Register the straight-through flow when the router is built.
    pub default_flow: bool,

    /// Name given to delivery threads.
    pub thread_name: String,
}

impl Default for NmrConfig {
    fn default() -> Self {
        Self {
            executor_threads: DEFAULT_EXECUTOR_THREADS,
            sync_delivery: false,
            enforce_authorization: false,
            default_flow: true,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl NmrConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `NMR_EXECUTOR_THREADS`: Delivery threads (default: 8)
    /// - `NMR_SYNC_DELIVERY`: Deliver on the sending thread (default: false)
    /// - `NMR_ENFORCE_AUTHORIZATION`: Enforce ACLs on dispatch (default: false)
    /// - `NMR_DEFAULT_FLOW`: Register the straight-through flow (default: true)
    /// - `NMR_THREAD_NAME`: Delivery thread name (default: nmr-delivery)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            executor_threads: env::var("NMR_EXECUTOR_THREADS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.executor_threads),

            sync_delivery: env::var("NMR_SYNC_DELIVERY")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.sync_delivery),

            enforce_authorization: env::var("NMR_ENFORCE_AUTHORIZATION")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.enforce_authorization),

            default_flow: env::var("NMR_DEFAULT_FLOW")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.default_flow),

            thread_name: env::var("NMR_THREAD_NAME").unwrap_or(defaults.thread_name),
        }
    }

    /// Builder-style toggle for synchronous delivery.
    #[must_use]
    pub fn with_sync_delivery(mut self, sync_delivery: bool) -> Self {
        self.sync_delivery = sync_delivery;
        self
    }

    /// Builder-style toggle for authorization enforcement.
    #[must_use]
    pub fn with_authorization(mut self, enforce: bool) -> Self {
        self.enforce_authorization = enforce;
        self
    }

    /// Builder-style toggle for the built-in flow.
    #[must_use]
    pub fn with_default_flow(mut self, default_flow: bool) -> Self {
        self.default_flow = default_flow;
        self
    }

    #[must_use]
    pub fn with_executor_threads(mut self, threads: usize) -> Self {
        self.executor_threads = threads;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), NmrError> {
        if self.executor_threads == 0 {
            return Err(NmrError::InvalidConfig(
                "executor_threads must be at least 1".to_string(),
            ));
        }
        if self.thread_name.trim().is_empty() {
            return Err(NmrError::InvalidConfig(
                "thread_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    value.to_lowercase() == "true" || value == "1"
}

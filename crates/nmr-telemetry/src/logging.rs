//! Structured logging helpers.
//!
//! Router logs carry a fixed set of fields so they can be filtered and
//! correlated:
//! - `exchange_id`: exchange UUID
//! - `pattern`: exchange pattern
//! - `status`: exchange status
//! - `endpoint`: endpoint name or id

/// Log an exchange-related event with standard fields.
///
/// ```rust,ignore
/// log_exchange!(info, "Reply received", exchange);
/// log_exchange!(warn, "Reply timed out", exchange, timeout_ms = 500);
/// ```
#[macro_export]
macro_rules! log_exchange {
    ($level:ident, $msg:expr, $exchange:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            exchange_id = %$exchange.id(),
            pattern = %$exchange.pattern(),
            status = %$exchange.status(),
            $($($field)*,)?
            $msg
        )
    };
}

/// Log an endpoint-related event with standard fields.
#[macro_export]
macro_rules! log_endpoint {
    ($level:ident, $msg:expr, $endpoint:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            endpoint = %$endpoint,
            $($($field)*,)?
            $msg
        )
    };
}

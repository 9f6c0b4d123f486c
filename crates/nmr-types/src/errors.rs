//! # Error Types
//!
//! The error taxonomy of the router. Every fallible library call returns
//! `Result<_, NmrError>`; errors captured on an exchange are stored as
//! `anyhow::Error` by the engine and can be downcast back to `NmrError`.

use thiserror::Error;

/// Errors raised by the router.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NmrError {
    /// Illegal status/role transition or pattern-violating slot usage.
    #[error("Invalid exchange state: {0}")]
    InvalidExchangeState(String),

    /// The target resolved to no candidate any flow would carry.
    #[error("No endpoint available for target {target}")]
    NoEndpointAvailable { target: String },

    /// A reply shape the exchange pattern does not permit.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Every candidate was rejected by the authorization gate.
    #[error("Endpoint {endpoint} is not authorized for this subject")]
    NotAuthorized { endpoint: String },

    /// The channel was closed before the send.
    #[error("Channel {0} is closed")]
    ChannelClosed(String),

    /// The bus that owned this channel has been dropped.
    #[error("Message router has been shut down")]
    BusShutdown,

    /// An LDAP-style filter expression could not be parsed.
    #[error("Invalid filter at position {position}: {reason}")]
    InvalidFilter { position: usize, reason: String },

    /// An authorization pattern is not a valid regular expression.
    #[error("Invalid pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A serialized reference document could not be decoded.
    #[error("Invalid reference document: {0}")]
    InvalidReference(String),

    /// The delivery executor could not be started.
    #[error("Executor error: {0}")]
    Executor(String),

    /// Router configuration failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl NmrError {
    /// Shorthand for [`NmrError::InvalidExchangeState`].
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidExchangeState(reason.into())
    }

    /// Shorthand for [`NmrError::UnsupportedOperation`].
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedOperation(reason.into())
    }

    /// Returns true for the errors that describe a routing outcome rather than
    /// a caller mistake.
    #[must_use]
    pub fn is_routing_failure(&self) -> bool {
        matches!(
            self,
            Self::NoEndpointAvailable { .. } | Self::NotAuthorized { .. }
        )
    }
}

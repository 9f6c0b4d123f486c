//! # Exchange Patterns, Statuses and Roles
//!
//! The enumerations that drive the message exchange pattern (MEP) state
//! machine. The legality table itself lives in `nmr-core::mep`; this module
//! only answers per-pattern capability questions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The shape of a request/reply interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pattern {
    /// One-way; the provider terminates the exchange.
    InOnly,
    /// One-way with an optional fault back to the consumer.
    RobustInOnly,
    /// Request/response.
    InOut,
    /// Request with an optional response.
    InOptionalOut,
    /// Request with an optional response or fault.
    InOptionalRobustInOut,
}

impl Pattern {
    /// All patterns, in declaration order.
    pub const ALL: [Pattern; 5] = [
        Pattern::InOnly,
        Pattern::RobustInOnly,
        Pattern::InOut,
        Pattern::InOptionalOut,
        Pattern::InOptionalRobustInOut,
    ];

    /// Whether the provider may answer with an Out message.
    #[must_use]
    pub fn allows_out(self) -> bool {
        matches!(
            self,
            Self::InOut | Self::InOptionalOut | Self::InOptionalRobustInOut
        )
    }

    /// Whether the provider may answer with a Fault message.
    #[must_use]
    pub fn allows_fault(self) -> bool {
        matches!(
            self,
            Self::RobustInOnly | Self::InOut | Self::InOptionalRobustInOut
        )
    }

    /// Whether the provider may close the exchange with Done.
    #[must_use]
    pub fn allows_provider_done(self) -> bool {
        !matches!(self, Self::InOut)
    }

    /// Whether a given message slot may be populated on this pattern.
    #[must_use]
    pub fn allows(self, message_type: MessageType) -> bool {
        match message_type {
            MessageType::In => true,
            MessageType::Out => self.allows_out(),
            MessageType::Fault => self.allows_fault(),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InOnly => "InOnly",
            Self::RobustInOnly => "RobustInOnly",
            Self::InOut => "InOut",
            Self::InOptionalOut => "InOptionalOut",
            Self::InOptionalRobustInOut => "InOptionalRobustInOut",
        };
        f.write_str(name)
    }
}

/// Lifecycle status of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Still being processed.
    Active,
    /// Completed successfully.
    Done,
    /// Completed with an error.
    Error,
}

impl Status {
    /// Done and Error are absorbing.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Which side of the exchange currently owns processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Consumer,
    Provider,
}

impl Role {
    /// The counterpart role.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Consumer => Self::Provider,
            Self::Provider => Self::Consumer,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Message slot within an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    In,
    Out,
    Fault,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

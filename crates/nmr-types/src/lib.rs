//! # NMR Types Crate
//!
//! Value types shared by the Normalized Message Router crates.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: Patterns, statuses, roles and the error
//!   taxonomy are defined here and nowhere else.
//! - **Plain Values**: Nothing in this crate knows about channels, registries
//!   or threads. The engine lives in `nmr-core`.
//! - **Re-readable Content**: Stream bodies are single-pass; anything that
//!   displays, copies or persists a message buffers its streams first.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod errors;
pub mod message;
pub mod pattern;
pub mod properties;
pub mod qname;
pub mod security;

pub use errors::*;
pub use message::{Content, Message, StreamContent};
pub use pattern::{MessageType, Pattern, Role, Status};
pub use properties::Properties;
pub use qname::QName;
pub use security::{Principal, Subject};

//! # NMR Core
//!
//! The exchange delivery and flow-dispatch engine of the Normalized Message
//! Router.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  send   ┌──────────┐ resolve ┌────────────┐ select ┌──────┐
//! │ Channel  │ ──────► │ MEP check│ ──────► │ Reference  │ ─────► │ Flow │
//! └──────────┘         └──────────┘         │ + Registry │        └──┬───┘
//!      ▲                                    └────────────┘           │
//!      │ reply                                                 deliver
//!      │                                                             ▼
//! ┌──────────┐  process  ┌──────────────────┐                ┌──────────────┐
//! │ Endpoint │ ◄──────── │ Delivery executor│ ◄───────────── │InternalEndpoint│
//! └──────────┘           └──────────────────┘                └──────────────┘
//! ```
//!
//! ## Ownership
//!
//! The [`Nmr`] context owns the endpoint arena and every registry.
//! Channels and slots hold `Weak` references back to it; exchanges refer to
//! endpoints by [`EndpointId`] only.
//!
//! ## Example
//!
//! ```rust,ignore
//! let nmr = Nmr::new(NmrConfig::default())?;
//! nmr.endpoint_registry().register(echo, Properties::from([("NAME", "Echo")]));
//!
//! let client = nmr.create_channel();
//! let exchange = client.create_exchange(Pattern::InOut);
//! exchange.set_target(nmr.endpoint_registry().lookup(Properties::from([("NAME", "Echo")])))?;
//! exchange.set_in(Message::with_body("Hello"))?;
//! assert!(client.send_sync(&exchange)?);
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod authorization;
pub mod channel;
pub mod config;
pub mod endpoint;
pub mod exchange;
mod executor;
pub mod filter;
pub mod flow;
pub mod listener;
mod mep;
pub mod nmr;
pub mod reference;
pub mod registry;
pub mod wire;

pub use authorization::{
    AuthorizationEntry, AuthorizationRegistry, AuthorizationType, SimpleAuthorizationEntry,
};
pub use channel::Channel;
pub use config::NmrConfig;
pub use endpoint::{Endpoint, EndpointId, InternalEndpoint};
pub use exchange::{Exchange, ExchangeId};
pub use filter::Filter;
pub use flow::{Flow, FlowRegistry, StraightThroughFlow};
pub use listener::{EndpointListener, ExchangeListener, Listener, ListenerKind, ListenerRegistry};
pub use nmr::Nmr;
pub use reference::{Candidates, Reference};
pub use registry::EndpointRegistry;
pub use wire::{Wire, WireRegistry};

pub use nmr_types::{
    Content, Message, MessageType, NmrError, Pattern, Principal, Properties, QName, Role, Status,
    Subject,
};

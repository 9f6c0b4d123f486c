//! # Listener Registry
//!
//! Observers of router activity. Two capabilities exist:
//!
//! - [`EndpointListener`]: endpoint registration and removal.
//! - [`ExchangeListener`]: exchanges sent, delivered and failed.
//!
//! A listener advertises its capabilities through [`Listener`], so one
//! object can observe both. Notification is best-effort: a panicking
//! listener is logged and skipped, it never reaches the sender.

use crate::endpoint::InternalEndpoint;
use crate::exchange::Exchange;
use nmr_types::Properties;
use parking_lot::RwLock;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Endpoint lifecycle notifications.
pub trait EndpointListener: Send + Sync {
    fn endpoint_registered(&self, endpoint: &InternalEndpoint) {
        let _ = endpoint;
    }

    fn endpoint_unregistered(&self, endpoint: &InternalEndpoint) {
        let _ = endpoint;
    }
}

/// Exchange traffic notifications.
pub trait ExchangeListener: Send + Sync {
    /// The exchange passed validation and is about to be dispatched.
    fn exchange_sent(&self, exchange: &Exchange) {
        let _ = exchange;
    }

    /// The exchange reached its destination (an endpoint or a waiting
    /// synchronous sender).
    fn exchange_delivered(&self, exchange: &Exchange) {
        let _ = exchange;
    }

    /// The exchange was failed by the router or by a provider error.
    fn exchange_failed(&self, exchange: &Exchange) {
        let _ = exchange;
    }
}

/// Capability discovery for registered listeners.
pub trait Listener: Send + Sync {
    fn as_endpoint_listener(&self) -> Option<&dyn EndpointListener> {
        None
    }

    fn as_exchange_listener(&self) -> Option<&dyn ExchangeListener> {
        None
    }
}

/// Listener capability selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Endpoint,
    Exchange,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum ExchangeEvent {
    Sent,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum EndpointEvent {
    Registered,
    Unregistered,
}

struct RegisteredListener {
    listener: Arc<dyn Listener>,
    properties: Properties,
}

/// Registration-ordered set of listeners.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<RegisteredListener>>,
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener. Registering the same instance twice replaces its
    /// properties.
    pub fn register(&self, listener: Arc<dyn Listener>, properties: Properties) {
        let mut listeners = self.listeners.write();
        if let Some(existing) = listeners
            .iter_mut()
            .find(|l| same_listener(&l.listener, &listener))
        {
            existing.properties = properties;
            return;
        }
        listeners.push(RegisteredListener {
            listener,
            properties,
        });
    }

    pub fn unregister(&self, listener: &Arc<dyn Listener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !same_listener(&l.listener, listener));
        listeners.len() != before
    }

    /// Snapshot of the listeners with the given capability.
    #[must_use]
    pub fn listeners(&self, kind: ListenerKind) -> Vec<Arc<dyn Listener>> {
        self.listeners
            .read()
            .iter()
            .filter(|l| match kind {
                ListenerKind::Endpoint => l.listener.as_endpoint_listener().is_some(),
                ListenerKind::Exchange => l.listener.as_exchange_listener().is_some(),
            })
            .map(|l| Arc::clone(&l.listener))
            .collect()
    }

    /// Registration properties of a listener.
    #[must_use]
    pub fn properties(&self, listener: &Arc<dyn Listener>) -> Option<Properties> {
        self.listeners
            .read()
            .iter()
            .find(|l| same_listener(&l.listener, listener))
            .map(|l| l.properties.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    pub(crate) fn fire_exchange(&self, event: ExchangeEvent, exchange: &Exchange) {
        for listener in self.listeners(ListenerKind::Exchange) {
            let Some(target) = listener.as_exchange_listener() else {
                continue;
            };
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| match event {
                ExchangeEvent::Sent => target.exchange_sent(exchange),
                ExchangeEvent::Delivered => target.exchange_delivered(exchange),
                ExchangeEvent::Failed => target.exchange_failed(exchange),
            }));
            if let Err(payload) = outcome {
                warn!(
                    exchange_id = %exchange.id(),
                    event = ?event,
                    panic = %panic_message(payload.as_ref()),
                    "Exchange listener panicked"
                );
            }
        }
    }

    pub(crate) fn fire_endpoint(&self, event: EndpointEvent, endpoint: &InternalEndpoint) {
        for listener in self.listeners(ListenerKind::Endpoint) {
            let Some(target) = listener.as_endpoint_listener() else {
                continue;
            };
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| match event {
                EndpointEvent::Registered => target.endpoint_registered(endpoint),
                EndpointEvent::Unregistered => target.endpoint_unregistered(endpoint),
            }));
            if let Err(payload) = outcome {
                warn!(
                    endpoint = %endpoint.name(),
                    event = ?event,
                    panic = %panic_message(payload.as_ref()),
                    "Endpoint listener panicked"
                );
            }
        }
    }
}

fn same_listener(a: &Arc<dyn Listener>, b: &Arc<dyn Listener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

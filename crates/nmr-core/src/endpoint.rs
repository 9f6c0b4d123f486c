//! # Endpoints
//!
//! An [`Endpoint`] is anything that can process exchanges: a service
//! provider, a consumer waiting for replies, or both. The router wraps each
//! registered endpoint in an [`InternalEndpoint`] slot that owns the
//! bookkeeping the engine needs (properties snapshot, close and retire flags,
//! in-flight count).
//!
//! Slots live in the bus-owned arena and are addressed by [`EndpointId`].
//! Exchanges only ever store ids, never slots, so nothing forms a cycle.

use crate::channel::Channel;
use crate::exchange::Exchange;
use crate::nmr::NmrInner;
use nmr_types::Properties;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;
use uuid::Uuid;

/// Identifier of an endpoint slot in the router arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(Uuid);

impl EndpointId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EndpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::str::FromStr for EndpointId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A participant of the router.
///
/// `process` is called with an exchange the endpoint now owns. Returning an
/// error (or panicking) while the exchange is still Active and unanswered
/// fails the exchange and routes it back to the counterpart.
pub trait Endpoint: Send + Sync {
    /// Receives the channel bound to this endpoint, once, at registration.
    fn set_channel(&self, channel: Channel) {
        let _ = channel;
    }

    /// Handles an exchange delivered to this endpoint.
    fn process(&self, exchange: Exchange) -> anyhow::Result<()>;
}

/// Identity key of an endpoint instance.
pub(crate) fn identity(endpoint: &Arc<dyn Endpoint>) -> usize {
    Arc::as_ptr(endpoint).cast::<()>() as usize
}

/// Router-side slot wrapping an [`Endpoint`].
pub struct InternalEndpoint {
    id: EndpointId,
    endpoint: Arc<dyn Endpoint>,
    properties: RwLock<Properties>,
    client: bool,
    closed: AtomicBool,
    retired: AtomicBool,
    in_flight: AtomicUsize,
    bus: Weak<NmrInner>,
}

impl InternalEndpoint {
    pub(crate) fn new(
        id: EndpointId,
        endpoint: Arc<dyn Endpoint>,
        properties: Properties,
        client: bool,
        bus: Weak<NmrInner>,
    ) -> Self {
        Self {
            id,
            endpoint,
            properties: RwLock::new(properties),
            client,
            closed: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            bus,
        }
    }

    #[must_use]
    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// The wrapped endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Arc<dyn Endpoint> {
        &self.endpoint
    }

    /// Snapshot of the registration properties.
    #[must_use]
    pub fn properties(&self) -> Properties {
        self.properties.read().clone()
    }

    /// Name used by the authorization gate: the `NAME` property, or the id.
    #[must_use]
    pub fn name(&self) -> String {
        self.properties
            .read()
            .get(Properties::NAME)
            .map(str::to_string)
            .unwrap_or_else(|| self.id.to_string())
    }

    /// Whether this slot backs a client channel created with
    /// [`Nmr::create_channel`](crate::Nmr::create_channel).
    #[must_use]
    pub fn is_client(&self) -> bool {
        self.client
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Unregistered or closed; kept only while exchanges reference it.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_untargetable(&self) -> bool {
        self.properties.read().flag(Properties::UNTARGETABLE)
    }

    /// Deliveries to this endpoint run on the dispatching thread.
    #[must_use]
    pub fn sync_delivery(&self) -> bool {
        self.client || self.properties.read().flag(Properties::CHANNEL_SYNC_DELIVERY)
    }

    /// Exchanges currently referencing this slot.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn bus(&self) -> &Weak<NmrInner> {
        &self.bus
    }

    pub(crate) fn set_properties(&self, properties: Properties) {
        *self.properties.write() = properties;
    }

    /// Pins the slot for an exchange. Returns false, without pinning, if
    /// the slot was retired concurrently.
    pub(crate) fn retain(&self) -> bool {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.retired.load(Ordering::SeqCst) {
            self.release();
            return false;
        }
        true
    }

    pub(crate) fn release(&self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 && self.is_retired() {
            if let Some(bus) = self.bus.upgrade() {
                bus.registry.reap(self.id);
            }
        }
    }

    /// Marks the slot retired. Returns true when it can be dropped now.
    pub(crate) fn retire(&self) -> bool {
        self.retired.store(true, Ordering::SeqCst);
        self.in_flight.load(Ordering::SeqCst) == 0
    }

    /// Closes the slot; returns false if it was already closed.
    pub(crate) fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        if first {
            debug!(endpoint = %self.name(), "Channel closed");
        }
        first
    }
}

impl fmt::Debug for InternalEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalEndpoint")
            .field("id", &self.id)
            .field("properties", &*self.properties.read())
            .field("client", &self.client)
            .field("closed", &self.is_closed())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl fmt::Display for InternalEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Endpoint[{}, {}]", self.id, self.properties.read())
    }
}

//! # Endpoint Registry
//!
//! The bus-owned arena of endpoint slots plus the indices used to find
//! them.
//!
//! ## Layout
//!
//! | Index | Key | Contents |
//! |-------|-----|----------|
//! | `slots` | `EndpointId` | every live slot, including client channels and retired slots still referenced by exchanges |
//! | `order` | registration sequence | registered, targetable-by-query endpoints |
//! | `by_identity` | endpoint instance address | id and sequence of a registered instance |
//!
//! Query results follow registration order. Iteration works on a snapshot
//! taken under the read lock, so listeners and endpoints are never invoked
//! with the lock held.

use crate::channel::Channel;
use crate::endpoint::{identity, Endpoint, EndpointId, InternalEndpoint};
use crate::filter::Filter;
use crate::listener::{EndpointEvent, ListenerRegistry};
use crate::nmr::NmrInner;
use crate::reference::Reference;
use crate::wire::{Wire, WireRegistry};
use nmr_telemetry::log_endpoint;
use nmr_types::{NmrError, Properties};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use tracing::debug;

#[derive(Default)]
struct RegistryState {
    slots: HashMap<EndpointId, Arc<InternalEndpoint>>,
    order: BTreeMap<u64, EndpointId>,
    by_identity: HashMap<usize, (EndpointId, u64)>,
    next_seq: u64,
}

/// Registry of endpoints known to one router.
pub struct EndpointRegistry {
    bus: Weak<NmrInner>,
    listeners: Arc<ListenerRegistry>,
    wires: WireRegistry,
    state: RwLock<RegistryState>,
}

impl EndpointRegistry {
    pub(crate) fn new(bus: Weak<NmrInner>, listeners: Arc<ListenerRegistry>) -> Self {
        Self {
            bus,
            listeners,
            wires: WireRegistry::new(),
            state: RwLock::new(RegistryState::default()),
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers an endpoint and returns its id.
    ///
    /// The first registration of an instance binds a [`Channel`] to it.
    /// Registering the same instance again replaces its properties and keeps
    /// the id.
    pub fn register(&self, endpoint: Arc<dyn Endpoint>, properties: Properties) -> EndpointId {
        let key = identity(&endpoint);

        if let Some(id) = self.update_existing(key, &properties) {
            return id;
        }

        let id = EndpointId::new();
        let slot = Arc::new(InternalEndpoint::new(
            id,
            Arc::clone(&endpoint),
            properties.clone(),
            false,
            self.bus.clone(),
        ));

        // Reserve the identity first; the slot only becomes routable once it
        // is in `order`, after its channel is bound.
        let seq = {
            let mut state = self.state.write();
            if state.by_identity.contains_key(&key) {
                drop(state);
                return self.update_existing(key, &properties).unwrap_or(id);
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.slots.insert(id, Arc::clone(&slot));
            state.by_identity.insert(key, (id, seq));
            seq
        };

        endpoint.set_channel(Channel::new(id, self.bus.clone()));

        {
            let mut state = self.state.write();
            if state.by_identity.get(&key) != Some(&(id, seq)) {
                // Unregistered while the channel was being bound.
                return id;
            }
            state.order.insert(seq, id);
        }

        log_endpoint!(info, "Endpoint registered", slot.name(), endpoint_id = %id, properties = %properties);
        self.listeners.fire_endpoint(EndpointEvent::Registered, &slot);
        id
    }

    fn update_existing(&self, key: usize, properties: &Properties) -> Option<EndpointId> {
        let slot = {
            let state = self.state.read();
            let (id, _) = state.by_identity.get(&key)?;
            state.slots.get(id).cloned()?
        };
        slot.set_properties(properties.clone());
        log_endpoint!(
            info,
            "Endpoint re-registered",
            slot.name(),
            endpoint_id = %slot.id(),
            properties = %properties
        );
        self.listeners.fire_endpoint(EndpointEvent::Registered, &slot);
        Some(slot.id())
    }

    /// Removes an endpoint. Returns false if it was not registered.
    ///
    /// Exchanges already routed to the endpoint still complete; its slot is
    /// dropped once the last of them finishes.
    pub fn unregister(&self, endpoint: &Arc<dyn Endpoint>, properties: &Properties) -> bool {
        let key = identity(endpoint);
        let slot = {
            let mut state = self.state.write();
            let Some((id, seq)) = state.by_identity.remove(&key) else {
                return false;
            };
            state.order.remove(&seq);
            let Some(slot) = state.slots.get(&id).cloned() else {
                return false;
            };
            if slot.retire() {
                state.slots.remove(&id);
            }
            slot
        };

        log_endpoint!(
            info,
            "Endpoint unregistered",
            slot.name(),
            endpoint_id = %slot.id(),
            properties = %properties,
            in_flight = slot.in_flight()
        );
        self.listeners.fire_endpoint(EndpointEvent::Unregistered, &slot);
        true
    }

    pub(crate) fn insert_client(&self, slot: Arc<InternalEndpoint>) {
        self.state.write().slots.insert(slot.id(), slot);
    }

    /// Drops a retired slot once nothing references it.
    pub(crate) fn reap(&self, id: EndpointId) {
        let mut state = self.state.write();
        let reclaim = state
            .slots
            .get(&id)
            .is_some_and(|slot| slot.is_retired() && slot.in_flight() == 0);
        if reclaim {
            state.slots.remove(&id);
            debug!(endpoint_id = %id, "Endpoint slot reclaimed");
        }
    }

    /// Retires a client slot after its channel closed.
    pub(crate) fn retire_client(&self, id: EndpointId) {
        let mut state = self.state.write();
        let reclaim = state
            .slots
            .get(&id)
            .is_some_and(|slot| slot.is_client() && slot.retire());
        if reclaim {
            state.slots.remove(&id);
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Endpoints whose properties are a superset of `properties`, after wire
    /// rewriting, in registration order.
    #[must_use]
    pub fn query(&self, properties: &Properties) -> Vec<Arc<dyn Endpoint>> {
        self.query_internal(properties)
            .into_iter()
            .map(|slot| Arc::clone(slot.endpoint()))
            .collect()
    }

    /// Endpoints matching `filter`, in registration order.
    #[must_use]
    pub fn query_filter(&self, filter: &Filter) -> Vec<Arc<dyn Endpoint>> {
        self.query_filter_internal(filter)
            .into_iter()
            .map(|slot| Arc::clone(slot.endpoint()))
            .collect()
    }

    pub(crate) fn query_internal(&self, properties: &Properties) -> Vec<Arc<InternalEndpoint>> {
        let query = self.wires.resolve(properties);
        self.select(|slot| slot.properties().matches(&query))
    }

    pub(crate) fn query_filter_internal(&self, filter: &Filter) -> Vec<Arc<InternalEndpoint>> {
        self.select(|slot| filter.matches(&slot.properties()))
    }

    fn select(&self, predicate: impl Fn(&InternalEndpoint) -> bool) -> Vec<Arc<InternalEndpoint>> {
        let state = self.state.read();
        state
            .order
            .values()
            .filter_map(|id| state.slots.get(id))
            .filter(|slot| predicate(slot))
            .cloned()
            .collect()
    }

    /// All registered endpoint slots, in registration order.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Arc<InternalEndpoint>> {
        self.select(|_| true)
    }

    /// Any live slot by id, including client channels.
    #[must_use]
    pub fn get(&self, id: EndpointId) -> Option<Arc<InternalEndpoint>> {
        self.state.read().slots.get(&id).cloned()
    }

    /// The stored property snapshot of a registered endpoint.
    #[must_use]
    pub fn properties(&self, endpoint: &Arc<dyn Endpoint>) -> Option<Properties> {
        let state = self.state.read();
        let (id, _) = state.by_identity.get(&identity(endpoint))?;
        state.slots.get(id).map(|slot| slot.properties())
    }

    /// Id of a registered endpoint instance.
    #[must_use]
    pub fn id_of(&self, endpoint: &Arc<dyn Endpoint>) -> Option<EndpointId> {
        self.state
            .read()
            .by_identity
            .get(&identity(endpoint))
            .map(|(id, _)| *id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().order.is_empty()
    }

    /// Number of arena slots, registered or not.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.state.read().slots.len()
    }

    // =========================================================================
    // References
    // =========================================================================

    /// Lazy reference to endpoints matching `properties`.
    #[must_use]
    pub fn lookup(&self, properties: Properties) -> Reference {
        Reference::properties(properties)
    }

    /// Lazy reference from an LDAP filter expression.
    pub fn lookup_filter(&self, expression: &str) -> Result<Reference, NmrError> {
        Ok(Reference::filter(Filter::parse(expression)?))
    }

    /// Lazy reference from a JSON reference document.
    pub fn lookup_document(&self, document: &str) -> Result<Reference, NmrError> {
        Reference::from_document(document)
    }

    // =========================================================================
    // Wires
    // =========================================================================

    pub fn register_wire(&self, wire: Wire) {
        self.wires.register(wire);
    }

    pub fn unregister_wire(&self, wire: &Wire) -> bool {
        self.wires.unregister(wire)
    }

    #[must_use]
    pub fn wires(&self) -> &WireRegistry {
        &self.wires
    }
}

//! # Flows
//!
//! A flow is a delivery strategy: given an exchange and a destination slot,
//! it decides whether it can carry the exchange and then does so. Local
//! in-process delivery is [`StraightThroughFlow`]; clustering or
//! transactional strategies plug in through the same trait.
//!
//! ## Selection
//!
//! On the first hop the target reference is resolved afresh, then for each
//! candidate (registration order) the flows are asked in registration order.
//! The first flow that accepts wins. Reply hops go straight back to the
//! already known counterpart, still through flow selection.

use crate::endpoint::{EndpointId, InternalEndpoint};
use crate::exchange::Exchange;
use crate::nmr::NmrInner;
use nmr_types::{NmrError, Properties, Role};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, trace};

/// Delivery strategy SPI.
pub trait Flow: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Whether this flow can carry `exchange` to `endpoint`.
    fn can_dispatch(&self, exchange: &Exchange, endpoint: &InternalEndpoint) -> bool;

    /// Carries `exchange` to `endpoint`, usually ending in
    /// [`InternalEndpoint::deliver`].
    fn dispatch(&self, exchange: Exchange, endpoint: &Arc<InternalEndpoint>) -> Result<(), NmrError>;
}

/// Hands the exchange directly to the destination's channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct StraightThroughFlow;

impl Flow for StraightThroughFlow {
    fn name(&self) -> &str {
        "straight-through"
    }

    fn can_dispatch(&self, _exchange: &Exchange, _endpoint: &InternalEndpoint) -> bool {
        true
    }

    fn dispatch(&self, exchange: Exchange, endpoint: &Arc<InternalEndpoint>) -> Result<(), NmrError> {
        endpoint.deliver(exchange)
    }
}

struct RegisteredFlow {
    flow: Arc<dyn Flow>,
    properties: Properties,
}

/// Registration-ordered set of flows.
#[derive(Default)]
pub struct FlowRegistry {
    flows: RwLock<Vec<RegisteredFlow>>,
}

impl FlowRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, flow: Arc<dyn Flow>, properties: Properties) {
        debug!(flow = flow.name(), "Flow registered");
        self.flows.write().push(RegisteredFlow { flow, properties });
    }

    pub fn unregister(&self, flow: &Arc<dyn Flow>) -> bool {
        let mut flows = self.flows.write();
        let before = flows.len();
        flows.retain(|f| !std::ptr::addr_eq(Arc::as_ptr(&f.flow), Arc::as_ptr(flow)));
        flows.len() != before
    }

    /// Snapshot of the registered flows, in registration order.
    #[must_use]
    pub fn flows(&self) -> Vec<Arc<dyn Flow>> {
        self.flows.read().iter().map(|f| Arc::clone(&f.flow)).collect()
    }

    #[must_use]
    pub fn properties(&self, flow: &Arc<dyn Flow>) -> Option<Properties> {
        self.flows
            .read()
            .iter()
            .find(|f| std::ptr::addr_eq(Arc::as_ptr(&f.flow), Arc::as_ptr(flow)))
            .map(|f| f.properties.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.flows.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flows.read().is_empty()
    }

    /// First flow accepting `exchange` for `endpoint`.
    pub(crate) fn select(&self, exchange: &Exchange, endpoint: &InternalEndpoint) -> Option<Arc<dyn Flow>> {
        self.flows()
            .into_iter()
            .find(|flow| flow.can_dispatch(exchange, endpoint))
    }
}

// =============================================================================
// Routing
// =============================================================================

/// Routes an exchange to its next hop.
pub(crate) fn route(bus: &NmrInner, exchange: &Exchange) -> Result<(), NmrError> {
    let (role, source, destination) = {
        let state = exchange.state();
        (state.role, state.source, state.destination)
    };
    match (role, destination) {
        (Role::Consumer, None) => route_to_target(bus, exchange),
        (Role::Consumer, Some(destination)) => route_to(bus, exchange, destination),
        (Role::Provider, _) => {
            let source = source.ok_or_else(|| NmrError::invalid_state("exchange has no source"))?;
            route_to(bus, exchange, source)
        }
    }
}

fn route_to_target(bus: &NmrInner, exchange: &Exchange) -> Result<(), NmrError> {
    let target = exchange
        .target()
        .ok_or_else(|| NmrError::invalid_state("exchange has no target"))?;

    let mut denied: Option<String> = None;
    for candidate in target.choose(&bus.registry) {
        if candidate.is_untargetable() || candidate.is_closed() || candidate.is_retired() {
            trace!(endpoint = %candidate.name(), "Skipping unavailable candidate");
            continue;
        }
        if bus.config.enforce_authorization && !authorized(bus, exchange, &candidate) {
            debug!(
                exchange_id = %exchange.id(),
                endpoint = %candidate.name(),
                "Candidate rejected by authorization"
            );
            denied.get_or_insert_with(|| candidate.name());
            continue;
        }
        let Some(flow) = bus.flows.select(exchange, &candidate) else {
            trace!(endpoint = %candidate.name(), "No flow accepts candidate");
            continue;
        };

        if !candidate.retain() {
            trace!(endpoint = %candidate.name(), "Candidate retired while routing");
            continue;
        }
        exchange.state().destination = Some(candidate.id());
        debug!(
            exchange_id = %exchange.id(),
            endpoint = %candidate.name(),
            flow = flow.name(),
            "Exchange routed"
        );
        return flow.dispatch(exchange.clone(), &candidate);
    }

    Err(match denied {
        Some(endpoint) => NmrError::NotAuthorized { endpoint },
        None => NmrError::NoEndpointAvailable {
            target: target.to_string(),
        },
    })
}

fn route_to(bus: &NmrInner, exchange: &Exchange, id: EndpointId) -> Result<(), NmrError> {
    let unavailable = || NmrError::NoEndpointAvailable {
        target: format!("endpoint:{id}"),
    };
    let endpoint = bus.registry.get(id).ok_or_else(unavailable)?;
    let flow = bus.flows.select(exchange, &endpoint).ok_or_else(unavailable)?;
    flow.dispatch(exchange.clone(), &endpoint)
}

fn authorized(bus: &NmrInner, exchange: &Exchange, candidate: &InternalEndpoint) -> bool {
    let (operation, subject) = {
        let state = exchange.state();
        (
            state.operation.clone(),
            state
                .in_message
                .as_ref()
                .and_then(|message| message.security_subject().cloned()),
        )
    };
    bus.authorization
        .is_authorized(&candidate.name(), operation.as_ref(), subject.as_ref())
}

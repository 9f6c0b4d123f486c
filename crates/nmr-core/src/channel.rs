//! # Delivery Channels
//!
//! A [`Channel`] is an endpoint's handle on the router: it creates
//! exchanges, sends them and, for client channels, receives the replies.
//!
//! ## Send Path
//!
//! ```text
//! send ─► MEP validation ─► exchange_sent ─► flow::route ─► Flow::dispatch
//!                                                             │
//!                  InternalEndpoint::deliver ◄────────────────┘
//!                    │
//!                    ├─ counterpart blocked in send_sync ─► release rendezvous
//!                    ├─ sync delivery ─► process on this thread
//!                    ├─ sender blocked in send_sync ─► process on the handoff lane
//!                    └─ otherwise ─► process on the delivery pool
//! ```
//!
//! Routing failures on the first hop never surface from `send`: the exchange
//! is failed and delivered back to its source. Provider errors and panics
//! are caught the same way.

use crate::endpoint::{Endpoint, EndpointId, InternalEndpoint};
use crate::exchange::Exchange;
use crate::flow;
use crate::listener::{panic_message, ExchangeEvent};
use crate::mep;
use crate::nmr::NmrInner;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use nmr_types::{NmrError, Pattern, Role, Status};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, warn};

/// An endpoint's connection to the router.
#[derive(Clone)]
pub struct Channel {
    id: EndpointId,
    bus: Weak<NmrInner>,
    client: Option<Arc<ClientMailbox>>,
}

impl Channel {
    pub(crate) fn new(id: EndpointId, bus: Weak<NmrInner>) -> Self {
        Self {
            id,
            bus,
            client: None,
        }
    }

    pub(crate) fn client(id: EndpointId, bus: Weak<NmrInner>, receiver: Receiver<Exchange>) -> Self {
        Self {
            id,
            bus: bus.clone(),
            client: Some(Arc::new(ClientMailbox { id, bus, receiver })),
        }
    }

    /// Id of the endpoint slot this channel belongs to.
    #[must_use]
    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// Creates a new Active consumer-side exchange.
    #[must_use]
    pub fn create_exchange(&self, pattern: Pattern) -> Exchange {
        let exchange = Exchange::new(pattern);
        debug!(exchange_id = %exchange.id(), pattern = %pattern, "Exchange created");
        exchange
    }

    /// Sends without waiting for the counterpart.
    ///
    /// # Errors
    ///
    /// Validation failures (`InvalidExchangeState`, `UnsupportedOperation`),
    /// `ChannelClosed` and `BusShutdown`. Routing failures are reported on
    /// the exchange instead.
    pub fn send(&self, exchange: &Exchange) -> Result<(), NmrError> {
        let (bus, endpoint) = self.context()?;
        endpoint.dispatch(&bus, exchange)
    }

    /// Sends and blocks until the counterpart answers.
    pub fn send_sync(&self, exchange: &Exchange) -> Result<bool, NmrError> {
        self.send_sync_inner(exchange, None)
    }

    /// Sends and blocks until the counterpart answers or `timeout` elapses.
    ///
    /// Returns `Ok(false)` on timeout; the exchange is then left as it is
    /// and may still be completed by the counterpart. A zero timeout only
    /// checks for an answer that arrived during the send itself.
    pub fn send_sync_timeout(&self, exchange: &Exchange, timeout: Duration) -> Result<bool, NmrError> {
        self.send_sync_inner(exchange, Some(timeout))
    }

    fn send_sync_inner(&self, exchange: &Exchange, timeout: Option<Duration>) -> Result<bool, NmrError> {
        let (bus, endpoint) = self.context()?;
        let role = {
            let mut state = exchange.state();
            if state.status.is_terminal() {
                return Err(NmrError::invalid_state(
                    "only an Active exchange can be sent synchronously",
                ));
            }
            let role = state.role;
            state.set_waiting(role, true);
            role
        };
        let lock = exchange.lock_for(role);
        if let Err(error) = endpoint.dispatch(&bus, exchange) {
            exchange.state().set_waiting(role, false);
            return Err(error);
        }
        drop(bus);

        // A waiter already taken by the delivering side is owed a release.
        let answered = lock.wait(timeout) || {
            let abandoned = exchange.state().take_waiting(role);
            !abandoned && lock.wait(None)
        };
        if answered {
            exchange.state().role = role;
            Ok(true)
        } else {
            warn!(
                exchange_id = %exchange.id(),
                endpoint_id = %self.id,
                timeout_ms = timeout.map(|t| t.as_millis() as u64).unwrap_or_default(),
                "Synchronous send timed out"
            );
            Ok(false)
        }
    }

    /// Waits for an exchange delivered to a client channel.
    ///
    /// Always `None` for channels bound to registered endpoints, which
    /// receive through [`Endpoint::process`].
    #[must_use]
    pub fn receive(&self, timeout: Duration) -> Option<Exchange> {
        let client = self.client.as_ref()?;
        match client.receiver.recv_timeout(timeout) {
            Ok(exchange) => Some(exchange),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Non-blocking [`receive`](Self::receive).
    #[must_use]
    pub fn try_receive(&self) -> Option<Exchange> {
        self.client.as_ref()?.receiver.try_recv().ok()
    }

    /// Closes the channel. Later sends fail with `ChannelClosed`; exchanges
    /// already in flight still reach it. Idempotent.
    pub fn close(&self) {
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        if let Some(endpoint) = bus.registry.get(self.id) {
            endpoint.close();
            if endpoint.is_client() {
                bus.registry.retire_client(self.id);
            }
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.bus
            .upgrade()
            .and_then(|bus| bus.registry.get(self.id))
            .map_or(true, |endpoint| endpoint.is_closed())
    }

    fn context(&self) -> Result<(Arc<NmrInner>, Arc<InternalEndpoint>), NmrError> {
        let bus = self.bus.upgrade().ok_or(NmrError::BusShutdown)?;
        let endpoint = bus
            .registry
            .get(self.id)
            .ok_or_else(|| NmrError::ChannelClosed(self.id.to_string()))?;
        Ok((bus, endpoint))
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("client", &self.client.is_some())
            .finish()
    }
}

// =============================================================================
// Client channels
// =============================================================================

/// Receiving side of a client channel. Dropping the last clone of the
/// channel closes it.
struct ClientMailbox {
    id: EndpointId,
    bus: Weak<NmrInner>,
    receiver: Receiver<Exchange>,
}

impl Drop for ClientMailbox {
    fn drop(&mut self) {
        Channel::new(self.id, self.bus.clone()).close();
    }
}

/// Endpoint backing a client channel: queues everything it is given.
pub(crate) struct ClientEndpoint {
    mailbox: Sender<Exchange>,
}

impl ClientEndpoint {
    pub(crate) fn new(mailbox: Sender<Exchange>) -> Self {
        Self { mailbox }
    }
}

impl Endpoint for ClientEndpoint {
    fn process(&self, exchange: Exchange) -> anyhow::Result<()> {
        self.mailbox
            .send(exchange)
            .map_err(|_| anyhow::anyhow!("client channel is no longer receiving"))
    }
}

// =============================================================================
// Engine side of the channel
// =============================================================================

impl InternalEndpoint {
    /// Validates and routes a send from this endpoint.
    pub(crate) fn dispatch(self: &Arc<Self>, bus: &Arc<NmrInner>, exchange: &Exchange) -> Result<(), NmrError> {
        if self.is_closed() {
            return Err(NmrError::ChannelClosed(self.id().to_string()));
        }

        let (first_hop, terminal, status, role) = {
            let mut state = exchange.state();
            mep::validate_send(&state, exchange.pattern(), self.id())?;
            let first_hop = state.source.is_none();
            if first_hop {
                if !self.retain() {
                    return Err(NmrError::ChannelClosed(self.id().to_string()));
                }
                state.source = Some(self.id());
            }
            state.sends += 1;
            state.in_transit = true;
            state.completed = state.status.is_terminal();
            (first_hop, state.completed, state.status, state.role)
        };

        debug!(
            exchange_id = %exchange.id(),
            endpoint = %self.name(),
            status = %status,
            role = %role,
            "Exchange sent"
        );
        bus.listeners.fire_exchange(ExchangeEvent::Sent, exchange);

        let finished = match flow::route(bus, exchange) {
            Ok(()) => terminal,
            Err(error) if first_hop => {
                self.return_failure(bus, exchange, error);
                true
            }
            Err(error) => {
                warn!(
                    exchange_id = %exchange.id(),
                    error = %error,
                    "Counterpart is no longer reachable"
                );
                let waiting = {
                    let mut state = exchange.state();
                    if !state.status.is_terminal() {
                        state.fail(error.into());
                    }
                    state.in_transit = false;
                    state.completed = true;
                    state.take_waiting(role)
                };
                bus.listeners.fire_exchange(ExchangeEvent::Failed, exchange);
                if waiting {
                    exchange.lock_for(role).release();
                }
                true
            }
        };

        if finished {
            release(bus, exchange);
        }
        Ok(())
    }

    /// Fails an unroutable exchange and hands it back to this, its source.
    fn return_failure(self: &Arc<Self>, bus: &Arc<NmrInner>, exchange: &Exchange, error: NmrError) {
        if error.is_routing_failure() {
            warn!(
                exchange_id = %exchange.id(),
                endpoint = %self.name(),
                error = %error,
                "Exchange could not be routed, returning it to its source"
            );
        } else {
            error!(
                exchange_id = %exchange.id(),
                endpoint = %self.name(),
                error = %error,
                "Flow failed to dispatch exchange, returning it to its source"
            );
        }
        {
            let mut state = exchange.state();
            state.fail(error.into());
            state.role = Role::Provider;
            state.completed = true;
        }
        bus.listeners.fire_exchange(ExchangeEvent::Failed, exchange);
        self.deliver_with(bus, exchange.clone());
    }

    /// Hands an exchange to this endpoint. This is the contract every
    /// [`Flow`](crate::Flow) ends with.
    ///
    /// # Errors
    ///
    /// `BusShutdown` if the router is gone.
    pub fn deliver(self: &Arc<Self>, exchange: Exchange) -> Result<(), NmrError> {
        let bus = self.bus().upgrade().ok_or(NmrError::BusShutdown)?;
        self.deliver_with(&bus, exchange);
        Ok(())
    }

    pub(crate) fn deliver_with(self: &Arc<Self>, bus: &Arc<NmrInner>, exchange: Exchange) {
        let (sender, answered, sender_waiting) = {
            let mut state = exchange.state();
            let sender = state.role;
            let answered = state.take_waiting(sender.opposite());
            if answered {
                state.in_transit = false;
            }
            (sender, answered, state.is_waiting(sender))
        };

        if answered {
            debug!(
                exchange_id = %exchange.id(),
                endpoint = %self.name(),
                "Exchange handed to synchronous sender"
            );
            bus.listeners.fire_exchange(ExchangeEvent::Delivered, &exchange);
            exchange.lock_for(sender.opposite()).release();
            return;
        }

        if self.sync_delivery() || bus.config.sync_delivery {
            self.process(bus, exchange);
            return;
        }
        let endpoint = Arc::clone(self);
        let handle = Arc::clone(bus);
        if sender_waiting {
            bus.executor
                .execute_for_waiter(move || endpoint.process(&handle, exchange));
        } else {
            bus.executor
                .execute(move || endpoint.process(&handle, exchange));
        }
    }

    fn process(self: &Arc<Self>, bus: &Arc<NmrInner>, exchange: Exchange) {
        let sends = {
            let mut state = exchange.state();
            state.role = state.role.opposite();
            state.in_transit = false;
            state.sends
        };
        bus.listeners.fire_exchange(ExchangeEvent::Delivered, &exchange);
        debug!(
            exchange_id = %exchange.id(),
            endpoint = %self.name(),
            "Exchange delivered"
        );

        let endpoint = Arc::clone(self.endpoint());
        let handed = exchange.clone();
        let error = match panic::catch_unwind(AssertUnwindSafe(move || endpoint.process(handed))) {
            Ok(Ok(())) => return,
            Ok(Err(error)) => error,
            Err(payload) => anyhow::anyhow!("endpoint panicked: {}", panic_message(payload.as_ref())),
        };
        self.handle_failure(bus, &exchange, error, sends);
    }

    /// Converts a processing error into an Error reply, unless the endpoint
    /// already answered or the exchange is complete.
    fn handle_failure(self: &Arc<Self>, bus: &Arc<NmrInner>, exchange: &Exchange, error: anyhow::Error, sends: u64) {
        warn!(
            exchange_id = %exchange.id(),
            endpoint = %self.name(),
            error = %error,
            "Endpoint failed to process exchange"
        );
        let owned = {
            let mut state = exchange.state();
            let owned = state.sends == sends && !state.in_transit && state.status == Status::Active;
            if owned {
                state.fail(error);
            }
            owned
        };
        if !owned {
            return;
        }
        bus.listeners.fire_exchange(ExchangeEvent::Failed, exchange);
        if let Err(error) = self.dispatch(bus, exchange) {
            warn!(
                exchange_id = %exchange.id(),
                error = %error,
                "Failed exchange could not be returned"
            );
        }
    }
}

/// Releases the endpoint slots an exchange pinned, once.
fn release(bus: &NmrInner, exchange: &Exchange) {
    if !exchange.mark_released() {
        return;
    }
    let (source, destination) = {
        let state = exchange.state();
        (state.source, state.destination)
    };
    for id in [source, destination].into_iter().flatten() {
        if let Some(endpoint) = bus.registry.get(id) {
            endpoint.release();
        }
    }
}

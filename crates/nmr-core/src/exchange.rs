//! # Message Exchange
//!
//! An exchange is the unit of work carried by the router: a pattern-typed
//! conversation between a consumer and a provider with up to three message
//! slots (In, Out, Fault), a status and a role.
//!
//! ## Sharing
//!
//! `Exchange` is a cheap handle. Cloning it does NOT copy the conversation;
//! every clone observes the same state, which is how the consumer and the
//! provider see each other's replies. State lives behind a
//! `parking_lot::Mutex` that is never held while user code runs.
//!
//! ## Engine-owned Fields
//!
//! Source, destination, role and the completion flag are only written by the
//! channel and flow code in this crate. Endpoints read them.

use crate::endpoint::EndpointId;
use crate::reference::Reference;
use crossbeam_channel::{bounded, Receiver, Sender};
use nmr_types::{Message, MessageType, NmrError, Pattern, QName, Role, Status};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use uuid::Uuid;

/// Unique exchange identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(Uuid);

impl ExchangeId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExchangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// One-shot handoff between a blocked synchronous sender and the delivery
/// that answers it. A release with nobody waiting is buffered, so a late
/// waiter never blocks and a late release never deadlocks.
pub(crate) struct Rendezvous {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Rendezvous {
    fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    pub(crate) fn release(&self) {
        // A full slot already holds a pending release.
        let _ = self.tx.try_send(());
    }

    /// Returns false when the timeout elapsed first. A zero timeout polls.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> bool {
        match timeout {
            None => self.rx.recv().is_ok(),
            Some(timeout) if timeout.is_zero() => self.rx.try_recv().is_ok(),
            Some(timeout) => self.rx.recv_timeout(timeout).is_ok(),
        }
    }
}

/// Mutable part of an exchange.
pub(crate) struct ExchangeState {
    pub(crate) status: Status,
    pub(crate) role: Role,
    pub(crate) target: Option<Reference>,
    pub(crate) source: Option<EndpointId>,
    pub(crate) destination: Option<EndpointId>,
    pub(crate) properties: BTreeMap<String, Value>,
    pub(crate) operation: Option<QName>,
    pub(crate) error: Option<Arc<anyhow::Error>>,
    pub(crate) in_message: Option<Message>,
    pub(crate) out_message: Option<Message>,
    pub(crate) fault: Option<Message>,
    /// Number of accepted sends, both directions.
    pub(crate) sends: u64,
    /// Dispatched and not yet handed to the counterpart.
    pub(crate) in_transit: bool,
    /// A terminal status has been sent.
    pub(crate) completed: bool,
    consumer_waiting: bool,
    provider_waiting: bool,
}

impl ExchangeState {
    fn new() -> Self {
        Self {
            status: Status::Active,
            role: Role::Consumer,
            target: None,
            source: None,
            destination: None,
            properties: BTreeMap::new(),
            operation: None,
            error: None,
            in_message: None,
            out_message: None,
            fault: None,
            sends: 0,
            in_transit: false,
            completed: false,
            consumer_waiting: false,
            provider_waiting: false,
        }
    }

    /// Whether the sender of `role` is blocked in `send_sync`.
    pub(crate) fn is_waiting(&self, role: Role) -> bool {
        match role {
            Role::Consumer => self.consumer_waiting,
            Role::Provider => self.provider_waiting,
        }
    }

    pub(crate) fn set_waiting(&mut self, role: Role, waiting: bool) {
        match role {
            Role::Consumer => self.consumer_waiting = waiting,
            Role::Provider => self.provider_waiting = waiting,
        }
    }

    /// Claims the blocked sender of `role`. Whoever claims it owes that
    /// sender exactly one release.
    pub(crate) fn take_waiting(&mut self, role: Role) -> bool {
        let waiting = self.is_waiting(role);
        self.set_waiting(role, false);
        waiting
    }

    pub(crate) fn message(&self, message_type: MessageType) -> Option<&Message> {
        match message_type {
            MessageType::In => self.in_message.as_ref(),
            MessageType::Out => self.out_message.as_ref(),
            MessageType::Fault => self.fault.as_ref(),
        }
    }

    /// Marks the exchange failed with a captured error.
    pub(crate) fn fail(&mut self, error: anyhow::Error) {
        self.status = Status::Error;
        self.error = Some(Arc::new(error));
    }
}

struct ExchangeInner {
    id: ExchangeId,
    pattern: Pattern,
    state: Mutex<ExchangeState>,
    consumer_lock: OnceLock<Rendezvous>,
    provider_lock: OnceLock<Rendezvous>,
    released: AtomicBool,
}

/// Shared handle to a message exchange.
#[derive(Clone)]
pub struct Exchange {
    inner: Arc<ExchangeInner>,
}

impl Exchange {
    /// Creates an Active consumer-side exchange. Channels are the public
    /// way to obtain one, see [`Channel::create_exchange`](crate::Channel::create_exchange).
    pub(crate) fn new(pattern: Pattern) -> Self {
        Self {
            inner: Arc::new(ExchangeInner {
                id: ExchangeId::new(),
                pattern,
                state: Mutex::new(ExchangeState::new()),
                consumer_lock: OnceLock::new(),
                provider_lock: OnceLock::new(),
                released: AtomicBool::new(false),
            }),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[must_use]
    pub fn id(&self) -> ExchangeId {
        self.inner.id
    }

    #[must_use]
    pub fn pattern(&self) -> Pattern {
        self.inner.pattern
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.state().status
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.state().role
    }

    #[must_use]
    pub fn target(&self) -> Option<Reference> {
        self.state().target.clone()
    }

    /// Endpoint that first sent the exchange.
    #[must_use]
    pub fn source(&self) -> Option<EndpointId> {
        self.state().source
    }

    /// Endpoint chosen as provider.
    #[must_use]
    pub fn destination(&self) -> Option<EndpointId> {
        self.state().destination
    }

    #[must_use]
    pub fn operation(&self) -> Option<QName> {
        self.state().operation.clone()
    }

    /// Error captured when the exchange moved to `Status::Error`.
    #[must_use]
    pub fn error(&self) -> Option<Arc<anyhow::Error>> {
        self.state().error.clone()
    }

    /// The captured error if it is one of the router's own.
    #[must_use]
    pub fn error_kind(&self) -> Option<NmrError> {
        self.error()
            .and_then(|err| err.downcast_ref::<NmrError>().cloned())
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<Value> {
        self.state().properties.get(name).cloned()
    }

    /// Snapshot of all exchange properties.
    #[must_use]
    pub fn properties(&self) -> BTreeMap<String, Value> {
        self.state().properties.clone()
    }

    #[must_use]
    pub fn message(&self, message_type: MessageType) -> Option<Message> {
        self.state().message(message_type).cloned()
    }

    #[must_use]
    pub fn in_message(&self) -> Option<Message> {
        self.message(MessageType::In)
    }

    #[must_use]
    pub fn out_message(&self) -> Option<Message> {
        self.message(MessageType::Out)
    }

    #[must_use]
    pub fn fault(&self) -> Option<Message> {
        self.message(MessageType::Fault)
    }

    // =========================================================================
    // Mutators
    // =========================================================================

    /// Populates a message slot.
    ///
    /// # Errors
    ///
    /// `UnsupportedOperation` if the pattern has no such slot,
    /// `InvalidExchangeState` if the exchange is already terminal.
    pub fn set_message(&self, message_type: MessageType, message: Message) -> Result<(), NmrError> {
        let pattern = self.pattern();
        if !pattern.allows(message_type) {
            return Err(NmrError::unsupported(format!(
                "{message_type} message is not allowed on a {pattern} exchange"
            )));
        }
        let mut state = self.mutable()?;
        match message_type {
            MessageType::In => state.in_message = Some(message),
            MessageType::Out => state.out_message = Some(message),
            MessageType::Fault => state.fault = Some(message),
        }
        Ok(())
    }

    pub fn set_in(&self, message: Message) -> Result<(), NmrError> {
        self.set_message(MessageType::In, message)
    }

    pub fn set_out(&self, message: Message) -> Result<(), NmrError> {
        self.set_message(MessageType::Out, message)
    }

    pub fn set_fault(&self, message: Message) -> Result<(), NmrError> {
        self.set_message(MessageType::Fault, message)
    }

    /// Moves the exchange to `status`. Terminal statuses are absorbing.
    pub fn set_status(&self, status: Status) -> Result<(), NmrError> {
        let mut state = self.mutable()?;
        state.status = status;
        Ok(())
    }

    /// Sets `Status::Error` and captures `error`.
    pub fn set_error(&self, error: impl Into<anyhow::Error>) -> Result<(), NmrError> {
        let mut state = self.mutable()?;
        state.fail(error.into());
        Ok(())
    }

    /// Sets the routing target. Only allowed before the first send.
    pub fn set_target(&self, target: Reference) -> Result<(), NmrError> {
        let mut state = self.mutable()?;
        if state.source.is_some() {
            return Err(NmrError::invalid_state(format!(
                "exchange {} has already been sent; its target is fixed",
                self.inner.id
            )));
        }
        state.target = Some(target);
        Ok(())
    }

    pub fn set_operation(&self, operation: QName) -> Result<(), NmrError> {
        let mut state = self.mutable()?;
        state.operation = Some(operation);
        Ok(())
    }

    pub fn set_property(&self, name: impl Into<String>, value: impl Into<Value>) -> Result<(), NmrError> {
        let mut state = self.mutable()?;
        state.properties.insert(name.into(), value.into());
        Ok(())
    }

    pub fn remove_property(&self, name: &str) -> Result<Option<Value>, NmrError> {
        let mut state = self.mutable()?;
        Ok(state.properties.remove(name))
    }

    /// Buffers stream content of every populated message.
    ///
    /// Streams are read outside the exchange lock; clones share their
    /// stream state with the messages on the exchange.
    pub fn ensure_re_readable(&self) -> io::Result<()> {
        let messages: Vec<Message> = {
            let state = self.state();
            [MessageType::In, MessageType::Out, MessageType::Fault]
                .into_iter()
                .filter_map(|message_type| state.message(message_type).cloned())
                .collect()
        };
        for message in &messages {
            message.ensure_re_readable()?;
        }
        Ok(())
    }

    /// Human readable rendering. With `show_content`, stream bodies are
    /// buffered so they can be shown and still read afterwards.
    #[must_use]
    pub fn display(&self, show_content: bool) -> String {
        let state = self.state();
        let mut out = format!(
            "Exchange[id: {}, status: {}, role: {}, pattern: {}",
            self.inner.id, state.status, state.role, self.inner.pattern
        );
        if let Some(target) = &state.target {
            let _ = write!(out, ", target: {target}");
        }
        if let Some(operation) = &state.operation {
            let _ = write!(out, ", operation: {operation}");
        }
        if !state.properties.is_empty() {
            let rendered = serde_json::to_string(&state.properties).unwrap_or_default();
            let _ = write!(out, ", properties: {rendered}");
        }
        for (label, message) in [
            ("in", &state.in_message),
            ("out", &state.out_message),
            ("fault", &state.fault),
        ] {
            if let Some(message) = message {
                let _ = write!(out, ", {label}: {}", message.display(show_content));
            }
        }
        if let Some(error) = &state.error {
            let _ = write!(out, ", error: {error}");
        }
        out.push(']');
        out
    }

    // =========================================================================
    // Engine internals
    // =========================================================================

    pub(crate) fn state(&self) -> MutexGuard<'_, ExchangeState> {
        self.inner.state.lock()
    }

    fn mutable(&self) -> Result<MutexGuard<'_, ExchangeState>, NmrError> {
        let state = self.state();
        if state.status.is_terminal() {
            return Err(NmrError::invalid_state(format!(
                "exchange {} is {} and can no longer change",
                self.inner.id, state.status
            )));
        }
        Ok(state)
    }

    /// The rendezvous a sender in `role` waits on, created on first use.
    pub(crate) fn lock_for(&self, role: Role) -> &Rendezvous {
        match role {
            Role::Consumer => self.inner.consumer_lock.get_or_init(Rendezvous::new),
            Role::Provider => self.inner.provider_lock.get_or_init(Rendezvous::new),
        }
    }

    /// True exactly once: for the caller that releases the endpoint slots.
    pub(crate) fn mark_released(&self) -> bool {
        !self.inner.released.swap(true, Ordering::AcqRel)
    }

    /// Whether two handles refer to the same exchange.
    #[must_use]
    pub fn same_as(&self, other: &Exchange) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display(false))
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Exchange")
            .field("id", &self.inner.id)
            .field("pattern", &self.inner.pattern)
            .field("status", &state.status)
            .field("role", &state.role)
            .finish_non_exhaustive()
    }
}

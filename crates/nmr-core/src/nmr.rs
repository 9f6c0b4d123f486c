//! # Router Context
//!
//! [`Nmr`] owns everything a router instance needs: configuration, the
//! endpoint arena, listener, flow and authorization registries, and the
//! delivery executor. Channels and endpoint slots only hold `Weak`
//! references to it, so dropping the last `Nmr` handle tears the router
//! down even while endpoints still hold their channels.

use crate::authorization::AuthorizationRegistry;
use crate::channel::{Channel, ClientEndpoint};
use crate::config::NmrConfig;
use crate::endpoint::{EndpointId, InternalEndpoint};
use crate::executor::DeliveryExecutor;
use crate::flow::{FlowRegistry, StraightThroughFlow};
use crate::listener::ListenerRegistry;
use crate::registry::EndpointRegistry;
use nmr_types::{NmrError, Properties};
use std::fmt;
use std::sync::Arc;
use tracing::info;

pub(crate) struct NmrInner {
    pub(crate) config: NmrConfig,
    pub(crate) registry: EndpointRegistry,
    pub(crate) listeners: Arc<ListenerRegistry>,
    pub(crate) flows: FlowRegistry,
    pub(crate) authorization: AuthorizationRegistry,
    pub(crate) executor: DeliveryExecutor,
}

/// A Normalized Message Router instance.
#[derive(Clone)]
pub struct Nmr {
    inner: Arc<NmrInner>,
}

impl Nmr {
    /// Builds a router.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration does not validate, `Executor`
    /// if the delivery runtime cannot start.
    pub fn new(config: NmrConfig) -> Result<Self, NmrError> {
        config.validate()?;
        let executor = DeliveryExecutor::new(config.executor_threads, &config.thread_name)?;
        let listeners = Arc::new(ListenerRegistry::new());

        let flows = FlowRegistry::new();
        if config.default_flow {
            flows.register(Arc::new(StraightThroughFlow), Properties::new());
        }

        let inner = Arc::new_cyclic(|weak| NmrInner {
            registry: EndpointRegistry::new(weak.clone(), Arc::clone(&listeners)),
            listeners,
            flows,
            authorization: AuthorizationRegistry::new(),
            executor,
            config,
        });

        info!(
            executor_threads = inner.config.executor_threads,
            sync_delivery = inner.config.sync_delivery,
            enforce_authorization = inner.config.enforce_authorization,
            "Message router started"
        );
        Ok(Self { inner })
    }

    /// Builds a router from `NMR_*` environment variables.
    pub fn from_env() -> Result<Self, NmrError> {
        Self::new(NmrConfig::from_env())
    }

    #[must_use]
    pub fn config(&self) -> &NmrConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn endpoint_registry(&self) -> &EndpointRegistry {
        &self.inner.registry
    }

    #[must_use]
    pub fn listener_registry(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }

    #[must_use]
    pub fn flow_registry(&self) -> &FlowRegistry {
        &self.inner.flows
    }

    #[must_use]
    pub fn authorization_registry(&self) -> &AuthorizationRegistry {
        &self.inner.authorization
    }

    /// Creates a client channel: an anonymous, untargetable endpoint whose
    /// incoming exchanges are queued for [`Channel::receive`].
    #[must_use]
    pub fn create_channel(&self) -> Channel {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let id = EndpointId::new();
        let weak = Arc::downgrade(&self.inner);
        let slot = Arc::new(InternalEndpoint::new(
            id,
            Arc::new(ClientEndpoint::new(sender)),
            Properties::new().with(Properties::UNTARGETABLE, "true"),
            true,
            weak.clone(),
        ));
        self.inner.registry.insert_client(slot);
        Channel::client(id, weak, receiver)
    }
}

impl fmt::Debug for Nmr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Nmr")
            .field("config", &self.inner.config)
            .field("endpoints", &self.inner.registry.len())
            .field("flows", &self.inner.flows.len())
            .field("listeners", &self.inner.listeners.len())
            .finish()
    }
}

//! # Routing Scenarios
//!
//! Target resolution through property, filter, endpoint and document
//! references, wire rewriting, candidate ordering and flow selection.

#[cfg(test)]
mod tests {
    use super::super::support::{eventually, router, router_with, WAIT};
    use crate::fixtures::{named, Binding, EchoEndpoint};
    use nmr_core::{
        Exchange, Flow, InternalEndpoint, NmrConfig, NmrError, Pattern, Properties, Reference,
        Status, StraightThroughFlow, Wire,
    };
    use nmr_types::Message;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn send_to(nmr: &nmr_core::Nmr, target: Reference) -> Exchange {
        let client = nmr.create_channel();
        let exchange = client.create_exchange(Pattern::InOut);
        exchange.set_target(target).unwrap();
        exchange.set_in(Message::with_body("route me")).unwrap();
        assert!(client.send_sync_timeout(&exchange, WAIT).unwrap());
        exchange
    }

    #[test]
    fn test_filter_reference() {
        let nmr = router();
        let v1 = EchoEndpoint::new();
        let v2 = EchoEndpoint::new();
        nmr.endpoint_registry().register(
            v1.clone(),
            named("echo-v1")
                .with(Properties::SERVICE_NAME, "{urn:demo}Echo")
                .with("version", "1"),
        );
        nmr.endpoint_registry().register(
            v2.clone(),
            named("echo-v2")
                .with(Properties::SERVICE_NAME, "{urn:demo}Echo")
                .with("version", "2"),
        );

        let target = nmr
            .endpoint_registry()
            .lookup_filter("(&(SERVICE_NAME={urn:demo}Echo)(version>=2))")
            .unwrap();
        let exchange = send_to(&nmr, target);
        assert_eq!(exchange.status(), Status::Active);
        assert_eq!(v1.requests(), 0);
        assert_eq!(v2.requests(), 1);
    }

    #[test]
    fn test_candidates_in_registration_order() {
        let nmr = router();
        let first = EchoEndpoint::new();
        let second = EchoEndpoint::new();
        nmr.endpoint_registry()
            .register(first.clone(), named("a").with("group", "echo"));
        nmr.endpoint_registry()
            .register(second.clone(), named("b").with("group", "echo"));

        for _ in 0..3 {
            send_to(
                &nmr,
                nmr.endpoint_registry()
                    .lookup(Properties::from([("group", "echo")])),
            );
        }
        assert_eq!(first.requests(), 3);
        assert_eq!(second.requests(), 0);
    }

    #[test]
    fn test_untargetable_candidate_is_skipped() {
        let nmr = router();
        let hidden = EchoEndpoint::new();
        let visible = EchoEndpoint::new();
        nmr.endpoint_registry().register(
            hidden.clone(),
            named("hidden")
                .with("group", "echo")
                .with(Properties::UNTARGETABLE, "true"),
        );
        nmr.endpoint_registry()
            .register(visible.clone(), named("visible").with("group", "echo"));

        send_to(
            &nmr,
            Reference::properties(Properties::from([("group", "echo")])),
        );
        assert_eq!(hidden.requests(), 0);
        assert_eq!(visible.requests(), 1);
    }

    #[test]
    fn test_endpoint_reference_skips_untargetable() {
        let nmr = router();
        let hidden = EchoEndpoint::new();
        let id = nmr.endpoint_registry().register(
            hidden.clone(),
            named("hidden").with(Properties::UNTARGETABLE, "true"),
        );

        // Untargetable endpoints are never chosen by routing.
        let exchange = send_to(&nmr, Reference::endpoint(id));
        assert_eq!(exchange.status(), Status::Error);
        assert_eq!(hidden.requests(), 0);
    }

    #[test]
    fn test_document_reference() {
        let nmr = router();
        let echo = EchoEndpoint::new();
        let id = nmr.endpoint_registry().register(echo.clone(), named("echo"));

        let by_properties = nmr
            .endpoint_registry()
            .lookup_document(r#"{"properties": {"NAME": "echo"}}"#)
            .unwrap();
        let by_filter = nmr
            .endpoint_registry()
            .lookup_document(r#"{"filter": "(NAME=ec*)"}"#)
            .unwrap();
        let by_id = nmr
            .endpoint_registry()
            .lookup_document(&format!(r#"{{"endpoint": "{id}"}}"#))
            .unwrap();

        for target in [by_properties, by_filter, by_id] {
            assert_eq!(send_to(&nmr, target).status(), Status::Active);
        }
        assert_eq!(echo.requests(), 3);

        assert!(matches!(
            nmr.endpoint_registry()
                .lookup_document(r#"{"properties": {}, "filter": "(a=b)"}"#),
            Err(NmrError::InvalidReference(_))
        ));
        assert!(matches!(
            nmr.endpoint_registry().lookup_document(r#"{"filter": "(a=b"}"#),
            Err(NmrError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn test_reference_is_resolved_lazily() {
        let nmr = router();
        let target = nmr.endpoint_registry().lookup(named("late"));

        let exchange = send_to(&nmr, target.clone());
        assert_eq!(exchange.status(), Status::Error);

        let late = EchoEndpoint::new();
        nmr.endpoint_registry().register(late.clone(), named("late"));
        assert_eq!(send_to(&nmr, target).status(), Status::Active);
        assert_eq!(late.requests(), 1);
    }

    #[test]
    fn test_wire_redirects_lookup() {
        let nmr = router();
        let real = EchoEndpoint::new();
        nmr.endpoint_registry().register(real.clone(), named("real"));
        let wire = Wire::new(named("alias"), named("real"));
        nmr.endpoint_registry().register_wire(wire.clone());

        send_to(&nmr, nmr.endpoint_registry().lookup(named("alias")));
        assert_eq!(real.requests(), 1);

        assert!(nmr.endpoint_registry().unregister_wire(&wire));
        let exchange = send_to(&nmr, nmr.endpoint_registry().lookup(named("alias")));
        assert_eq!(exchange.status(), Status::Error);
    }

    // =========================================================================
    // Flows
    // =========================================================================

    /// Counts dispatches and hands over to the local flow.
    #[derive(Default)]
    struct CountingFlow {
        dispatched: AtomicUsize,
    }

    impl Flow for CountingFlow {
        fn name(&self) -> &str {
            "counting"
        }

        fn can_dispatch(&self, _exchange: &Exchange, endpoint: &InternalEndpoint) -> bool {
            endpoint.properties().get("zone") == Some("local") || endpoint.is_client()
        }

        fn dispatch(
            &self,
            exchange: Exchange,
            endpoint: &Arc<InternalEndpoint>,
        ) -> Result<(), NmrError> {
            self.dispatched.fetch_add(1, Ordering::SeqCst);
            StraightThroughFlow.dispatch(exchange, endpoint)
        }
    }

    #[test]
    fn test_custom_flow_carries_both_hops() {
        let nmr = router_with(NmrConfig::default().with_default_flow(false));
        let flow = Arc::new(CountingFlow::default());
        nmr.flow_registry().register(flow.clone(), Properties::new());

        nmr.endpoint_registry()
            .register(EchoEndpoint::new(), named("echo").with("zone", "local"));
        let exchange = send_to(&nmr, nmr.endpoint_registry().lookup(named("echo")));
        assert_eq!(exchange.status(), Status::Active);
        // Request to the provider, reply back to the client.
        assert_eq!(flow.dispatched.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_no_accepting_flow_is_unroutable() {
        let nmr = router_with(NmrConfig::default().with_default_flow(false));
        nmr.flow_registry()
            .register(Arc::new(CountingFlow::default()), Properties::new());
        let remote = EchoEndpoint::new();
        nmr.endpoint_registry()
            .register(remote.clone(), named("remote").with("zone", "far"));

        let exchange = send_to(&nmr, nmr.endpoint_registry().lookup(named("remote")));
        assert_eq!(exchange.status(), Status::Error);
        assert!(matches!(
            exchange.error_kind(),
            Some(NmrError::NoEndpointAvailable { .. })
        ));
        assert_eq!(remote.requests(), 0);
    }

    /// Carries exchanges to registered endpoints only, never back to clients.
    struct OutboundOnlyFlow;

    impl Flow for OutboundOnlyFlow {
        fn name(&self) -> &str {
            "outbound-only"
        }

        fn can_dispatch(&self, _exchange: &Exchange, endpoint: &InternalEndpoint) -> bool {
            !endpoint.is_client()
        }

        fn dispatch(
            &self,
            exchange: Exchange,
            endpoint: &Arc<InternalEndpoint>,
        ) -> Result<(), NmrError> {
            StraightThroughFlow.dispatch(exchange, endpoint)
        }
    }

    /// Answers with `send_sync_timeout` and records what the call returned.
    #[derive(Default)]
    struct BlockingReplier {
        binding: Binding,
        outcome: Mutex<Option<(bool, Status, Duration)>>,
    }

    impl nmr_core::Endpoint for BlockingReplier {
        fn set_channel(&self, channel: nmr_core::Channel) {
            self.binding.bind(channel);
        }

        fn process(&self, exchange: Exchange) -> anyhow::Result<()> {
            if exchange.status() != Status::Active {
                return Ok(());
            }
            let channel = self.binding.channel()?;
            exchange.set_out(Message::with_body("reply"))?;
            let started = Instant::now();
            let answered = channel.send_sync_timeout(&exchange, WAIT)?;
            *self.outcome.lock() = Some((answered, exchange.status(), started.elapsed()));
            Ok(())
        }
    }

    #[test]
    fn test_unreachable_consumer_releases_blocked_provider() {
        let nmr = router_with(NmrConfig::default().with_default_flow(false));
        nmr.flow_registry()
            .register(Arc::new(OutboundOnlyFlow), Properties::new());
        let replier = Arc::new(BlockingReplier::default());
        nmr.endpoint_registry()
            .register(replier.clone(), named("replier"));

        let client = nmr.create_channel();
        let exchange = client.create_exchange(Pattern::InOut);
        exchange
            .set_target(nmr.endpoint_registry().lookup(named("replier")))
            .unwrap();
        exchange.set_in(Message::with_body("ask")).unwrap();
        client.send(&exchange).unwrap();

        assert!(eventually(|| replier.outcome.lock().is_some()));
        let outcome = *replier.outcome.lock();
        let (answered, status, elapsed) = outcome.unwrap();
        assert!(answered);
        assert_eq!(status, Status::Error);
        assert!(elapsed < WAIT);
        assert!(matches!(
            exchange.error_kind(),
            Some(NmrError::NoEndpointAvailable { .. })
        ));
        assert!(client.try_receive().is_none());
    }
}

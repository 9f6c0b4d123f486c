//! # Listener Scenarios
//!
//! Endpoint and exchange events observed on a live router, including a
//! listener that panics on every callback.

#[cfg(test)]
mod tests {
    use super::super::support::{eventually, router, WAIT};
    use crate::fixtures::{named, request, CountingListener, EchoEndpoint};
    use nmr_core::{
        Endpoint, Exchange, ExchangeListener, Listener, ListenerKind, Pattern, Properties, Status,
    };
    use std::sync::Arc;

    struct Unstable;

    impl ExchangeListener for Unstable {
        fn exchange_sent(&self, _exchange: &Exchange) {
            panic!("listener bug");
        }

        fn exchange_delivered(&self, _exchange: &Exchange) {
            panic!("listener bug");
        }
    }

    impl Listener for Unstable {
        fn as_exchange_listener(&self) -> Option<&dyn ExchangeListener> {
            Some(self)
        }
    }

    #[test]
    fn test_endpoint_lifecycle_events() {
        let nmr = router();
        let listener = CountingListener::new();
        nmr.listener_registry()
            .register(listener.clone(), Properties::new());

        let echo: Arc<dyn Endpoint> = EchoEndpoint::new();
        let id = nmr
            .endpoint_registry()
            .register(Arc::clone(&echo), named("echo"));
        let again = nmr
            .endpoint_registry()
            .register(Arc::clone(&echo), named("echo").with("version", "2"));
        assert_eq!(id, again);
        assert_eq!(
            nmr.endpoint_registry().properties(&echo).unwrap().get("version"),
            Some("2")
        );
        assert_eq!(CountingListener::count(&listener.registered), 2);

        // Client channels are not endpoint registrations.
        let _client = nmr.create_channel();
        assert_eq!(CountingListener::count(&listener.registered), 2);

        assert!(nmr.endpoint_registry().unregister(&echo, &named("echo")));
        assert_eq!(CountingListener::count(&listener.unregistered), 1);
    }

    #[test]
    fn test_exchange_events_for_round_trip() {
        let nmr = router();
        let listener = CountingListener::new();
        nmr.listener_registry()
            .register(listener.clone(), Properties::new());
        let echo = EchoEndpoint::new();
        nmr.endpoint_registry().register(echo.clone(), named("echo"));
        let client = nmr.create_channel();

        let exchange = request(&client, Pattern::InOut, "echo", "x").unwrap();
        assert!(client.send_sync_timeout(&exchange, WAIT).unwrap());
        exchange.set_status(Status::Done).unwrap();
        client.send(&exchange).unwrap();
        assert!(eventually(|| echo.completions() == 1));

        // Request, reply and Done each go out and arrive once.
        assert_eq!(CountingListener::count(&listener.sent), 3);
        assert!(eventually(|| CountingListener::count(&listener.delivered) == 3));
        assert_eq!(CountingListener::count(&listener.failed), 0);
    }

    #[test]
    fn test_panicking_listener_does_not_break_routing() {
        let nmr = router();
        let listener = CountingListener::new();
        nmr.listener_registry()
            .register(Arc::new(Unstable), Properties::new());
        nmr.listener_registry()
            .register(listener.clone(), Properties::new());
        nmr.endpoint_registry().register(EchoEndpoint::new(), named("echo"));
        let client = nmr.create_channel();

        let exchange = request(&client, Pattern::InOut, "echo", "x").unwrap();
        assert!(client.send_sync_timeout(&exchange, WAIT).unwrap());
        assert_eq!(exchange.out_message().unwrap().body().as_text(), Some("x"));
        assert_eq!(CountingListener::count(&listener.sent), 2);
    }

    #[test]
    fn test_unregistered_listener_stops_receiving() {
        let nmr = router();
        let counting = CountingListener::new();
        let listener: Arc<dyn Listener> = counting.clone();
        nmr.listener_registry()
            .register(Arc::clone(&listener), Properties::from([("scope", "all")]));
        assert_eq!(
            nmr.listener_registry().listeners(ListenerKind::Endpoint).len(),
            1
        );
        assert_eq!(
            nmr.listener_registry().properties(&listener),
            Some(Properties::from([("scope", "all")]))
        );

        assert!(nmr.listener_registry().unregister(&listener));
        nmr.endpoint_registry().register(EchoEndpoint::new(), named("echo"));
        assert_eq!(CountingListener::count(&counting.registered), 0);
        assert!(nmr.listener_registry().is_empty());
    }
}

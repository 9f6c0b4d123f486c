//! # Exchange Pattern Scenarios
//!
//! Every pattern driven end to end through a live router:
//!
//! | Pattern | Provider answer | Consumer close |
//! |---------|-----------------|----------------|
//! | InOnly | Done | none |
//! | RobustInOnly | Done or Fault | Done after Fault |
//! | InOut | Out or Fault | Done or Error |
//! | InOptionalOut | Out | Done |
//! | InOptionalRobustInOut | Out or Fault | Done |

#[cfg(test)]
mod tests {
    use super::super::support::{eventually, router, WAIT};
    use crate::fixtures::{named, request, EchoEndpoint, FaultingEndpoint};
    use nmr_core::{NmrError, Pattern, Role, Status};
    use nmr_types::Message;

    #[test]
    fn test_in_out_round_trip_and_close() {
        let nmr = router();
        let echo = EchoEndpoint::new();
        nmr.endpoint_registry().register(echo.clone(), named("echo"));
        let client = nmr.create_channel();

        let exchange = request(&client, Pattern::InOut, "echo", "ping").unwrap();
        assert!(client.send_sync_timeout(&exchange, WAIT).unwrap());
        assert_eq!(exchange.status(), Status::Active);
        assert_eq!(exchange.role(), Role::Consumer);
        assert_eq!(exchange.out_message().unwrap().body().as_text(), Some("ping"));

        exchange.set_status(Status::Done).unwrap();
        client.send(&exchange).unwrap();
        assert!(eventually(|| echo.completions() == 1));
        assert_eq!(echo.requests(), 1);
    }

    #[test]
    fn test_in_out_fault_then_error_close() {
        let nmr = router();
        nmr.endpoint_registry()
            .register(FaultingEndpoint::new(), named("strict"));
        let client = nmr.create_channel();

        let exchange = request(&client, Pattern::InOut, "strict", "ping").unwrap();
        assert!(client.send_sync_timeout(&exchange, WAIT).unwrap());
        assert_eq!(exchange.fault().unwrap().body().as_text(), Some("rejected"));
        assert!(exchange.out_message().is_none());

        exchange.set_error(anyhow::anyhow!("consumer gave up")).unwrap();
        client.send(&exchange).unwrap();
        assert!(matches!(
            client.send(&exchange),
            Err(NmrError::InvalidExchangeState(_))
        ));
    }

    #[test]
    fn test_in_only_completed_by_provider() {
        let nmr = router();
        let echo = EchoEndpoint::new();
        nmr.endpoint_registry().register(echo.clone(), named("sink"));
        let client = nmr.create_channel();

        let exchange = request(&client, Pattern::InOnly, "sink", "event").unwrap();
        assert!(matches!(
            exchange.set_out(Message::with_body("nope")),
            Err(NmrError::UnsupportedOperation(_))
        ));
        assert!(client.send_sync_timeout(&exchange, WAIT).unwrap());
        assert_eq!(exchange.status(), Status::Done);
        assert_eq!(exchange.role(), Role::Consumer);

        // Terminal statuses are absorbing and final.
        assert!(exchange.set_status(Status::Active).is_err());
        assert!(client.send(&exchange).is_err());
    }

    #[test]
    fn test_robust_in_only_done_and_fault() {
        let nmr = router();
        nmr.endpoint_registry().register(EchoEndpoint::new(), named("echo"));
        nmr.endpoint_registry()
            .register(FaultingEndpoint::new(), named("strict"));
        let client = nmr.create_channel();

        let accepted = request(&client, Pattern::RobustInOnly, "echo", "a").unwrap();
        assert!(client.send_sync_timeout(&accepted, WAIT).unwrap());
        assert_eq!(accepted.status(), Status::Done);

        let faulted = request(&client, Pattern::RobustInOnly, "strict", "b").unwrap();
        assert!(client.send_sync_timeout(&faulted, WAIT).unwrap());
        assert_eq!(faulted.status(), Status::Active);
        assert!(faulted.fault().is_some());

        faulted.set_status(Status::Done).unwrap();
        client.send(&faulted).unwrap();
        assert_eq!(faulted.status(), Status::Done);
    }

    #[test]
    fn test_in_optional_out() {
        let nmr = router();
        let echo = EchoEndpoint::new();
        nmr.endpoint_registry().register(echo.clone(), named("echo"));
        let client = nmr.create_channel();

        let exchange = request(&client, Pattern::InOptionalOut, "echo", "maybe").unwrap();
        assert!(client.send_sync_timeout(&exchange, WAIT).unwrap());
        assert_eq!(exchange.out_message().unwrap().body().as_text(), Some("maybe"));

        exchange.set_status(Status::Done).unwrap();
        client.send(&exchange).unwrap();
        assert!(eventually(|| echo.completions() == 1));
    }

    #[test]
    fn test_in_optional_robust_in_out_fault() {
        let nmr = router();
        nmr.endpoint_registry()
            .register(FaultingEndpoint::new(), named("strict"));
        let client = nmr.create_channel();

        let exchange =
            request(&client, Pattern::InOptionalRobustInOut, "strict", "maybe").unwrap();
        assert!(client.send_sync_timeout(&exchange, WAIT).unwrap());
        assert!(exchange.fault().is_some());

        exchange.set_status(Status::Done).unwrap();
        client.send(&exchange).unwrap();
    }

    #[test]
    fn test_async_send_reply_reaches_mailbox() {
        let nmr = router();
        nmr.endpoint_registry().register(EchoEndpoint::new(), named("echo"));
        let client = nmr.create_channel();

        let exchange = request(&client, Pattern::InOut, "echo", "async").unwrap();
        client.send(&exchange).unwrap();
        let reply = client.receive(WAIT).unwrap();

        assert!(reply.same_as(&exchange));
        assert_eq!(reply.role(), Role::Consumer);
        assert_eq!(reply.out_message().unwrap().body().as_text(), Some("async"));
        assert!(client.try_receive().is_none());
    }

    #[test]
    fn test_consumer_cannot_answer_with_active() {
        let nmr = router();
        nmr.endpoint_registry().register(EchoEndpoint::new(), named("echo"));
        let client = nmr.create_channel();

        let exchange = request(&client, Pattern::InOut, "echo", "x").unwrap();
        assert!(client.send_sync_timeout(&exchange, WAIT).unwrap());
        assert!(matches!(
            client.send(&exchange),
            Err(NmrError::InvalidExchangeState(_))
        ));

        // The rejected send left the exchange usable.
        exchange.set_status(Status::Done).unwrap();
        client.send(&exchange).unwrap();
    }

    #[test]
    fn test_exchange_properties_travel_with_exchange() {
        let nmr = router();
        nmr.endpoint_registry().register(EchoEndpoint::new(), named("echo"));
        let client = nmr.create_channel();

        let exchange = request(&client, Pattern::InOut, "echo", "x").unwrap();
        exchange.set_property("correlation", "c-42").unwrap();
        client.send(&exchange).unwrap();
        let reply = client.receive(WAIT).unwrap();
        assert_eq!(
            reply.property("correlation"),
            Some(serde_json::Value::from("c-42"))
        );
    }
}

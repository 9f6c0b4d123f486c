//! # Concurrency Scenarios
//!
//! Many client threads sending synchronously while the registry changes
//! underneath them. Every send must complete, either answered or failed,
//! and every arena slot must be reclaimed once the traffic stops.

#[cfg(test)]
mod tests {
    use super::super::support::{eventually, router, router_with, WAIT};
    use crate::fixtures::{named, request, EchoEndpoint, ProxyEndpoint, SilentEndpoint};
    use nmr_core::{Endpoint, NmrConfig, NmrError, Pattern, Properties, Status};
    use rand::Rng;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    const THREADS: usize = 16;
    const ROUNDS: usize = 50;
    const CHURN_THREADS: usize = 100;
    const CHURN_ROUNDS: usize = 20;

    #[test]
    fn test_parallel_send_sync() {
        let nmr = router();
        let echo = EchoEndpoint::new();
        nmr.endpoint_registry().register(echo.clone(), named("echo"));

        thread::scope(|scope| {
            for worker in 0..THREADS {
                let nmr = nmr.clone();
                scope.spawn(move || {
                    let client = nmr.create_channel();
                    for round in 0..ROUNDS {
                        let body = format!("{worker}-{round}");
                        let exchange = request(&client, Pattern::InOut, "echo", &body).unwrap();
                        assert!(client.send_sync_timeout(&exchange, WAIT).unwrap());
                        assert_eq!(
                            exchange.out_message().unwrap().body().as_text(),
                            Some(body.as_str())
                        );
                        exchange.set_status(Status::Done).unwrap();
                        client.send(&exchange).unwrap();
                    }
                });
            }
        });

        assert_eq!(echo.requests(), THREADS * ROUNDS);
        assert!(eventually(|| echo.completions() == THREADS * ROUNDS));
        assert!(eventually(|| nmr.endpoint_registry().slot_count() == 1));
    }

    #[test]
    fn test_registry_churn_during_traffic() {
        let nmr = router();
        let group = Properties::from([("group", "echo")]);
        nmr.endpoint_registry()
            .register(EchoEndpoint::new(), named("stable").with("group", "echo"));
        let stop = AtomicBool::new(false);

        thread::scope(|scope| {
            scope.spawn(|| {
                let mut rng = rand::thread_rng();
                while !stop.load(Ordering::SeqCst) {
                    let transient: Arc<dyn Endpoint> = EchoEndpoint::new();
                    let properties = named("transient").with("group", "echo");
                    nmr.endpoint_registry()
                        .register(Arc::clone(&transient), properties.clone());
                    thread::sleep(Duration::from_micros(rng.gen_range(0..200)));
                    nmr.endpoint_registry().unregister(&transient, &properties);
                }
            });

            let senders: Vec<_> = (0..CHURN_THREADS)
                .map(|_| {
                    let group = group.clone();
                    let nmr = &nmr;
                    scope.spawn(move || {
                        let client = nmr.create_channel();
                        for round in 0..CHURN_ROUNDS {
                            // Odd rounds chase the transient endpoint, which may be gone.
                            let query = if round % 2 == 0 {
                                group.clone()
                            } else {
                                named("transient")
                            };
                            let exchange = client.create_exchange(Pattern::InOut);
                            exchange
                                .set_target(nmr.endpoint_registry().lookup(query))
                                .unwrap();
                            exchange
                                .set_in(nmr_types::Message::with_body("churn"))
                                .unwrap();
                            assert!(client.send_sync_timeout(&exchange, WAIT).unwrap());
                            match exchange.status() {
                                Status::Active => {
                                    assert!(exchange.out_message().is_some(), "{exchange}");
                                    exchange.set_status(Status::Done).unwrap();
                                    client.send(&exchange).unwrap();
                                }
                                Status::Error => assert!(
                                    round % 2 == 1
                                        && matches!(
                                            exchange.error_kind(),
                                            Some(NmrError::NoEndpointAvailable { .. })
                                        ),
                                    "{exchange}"
                                ),
                                Status::Done => panic!("InOut completed by provider: {exchange}"),
                            }
                        }
                    })
                })
                .collect();

            let results: Vec<_> = senders.into_iter().map(|sender| sender.join()).collect();
            stop.store(true, Ordering::SeqCst);
            for result in results {
                result.unwrap();
            }
        });

        assert_eq!(nmr.endpoint_registry().len(), 1);
        assert!(eventually(|| nmr.endpoint_registry().slot_count() == 1));
    }

    #[test]
    fn test_nested_send_sync_with_small_pool() {
        // Every proxy holds a delivery thread while its upstream call runs.
        let nmr = router_with(NmrConfig::default().with_executor_threads(2));
        let echo = EchoEndpoint::new();
        nmr.endpoint_registry().register(echo.clone(), named("echo"));
        let proxy = ProxyEndpoint::new("echo", WAIT);
        nmr.endpoint_registry().register(proxy.clone(), named("proxy"));

        thread::scope(|scope| {
            for worker in 0..THREADS {
                let nmr = &nmr;
                scope.spawn(move || {
                    let client = nmr.create_channel();
                    let body = format!("nested-{worker}");
                    let exchange = request(&client, Pattern::InOut, "proxy", &body).unwrap();
                    let answered = if worker % 2 == 0 {
                        client.send_sync(&exchange).unwrap()
                    } else {
                        client.send_sync_timeout(&exchange, WAIT).unwrap()
                    };
                    assert!(answered);
                    assert_eq!(exchange.status(), Status::Active, "{exchange}");
                    assert_eq!(
                        exchange.out_message().unwrap().body().as_text(),
                        Some(body.as_str())
                    );
                    exchange.set_status(Status::Done).unwrap();
                    client.send(&exchange).unwrap();
                });
            }
        });

        assert_eq!(proxy.forwarded.load(Ordering::SeqCst), THREADS);
        assert_eq!(echo.requests(), THREADS);
        assert!(eventually(|| echo.completions() == THREADS));
        assert!(eventually(|| nmr.endpoint_registry().slot_count() == 2));
    }

    #[test]
    fn test_zero_timeout_under_contention() {
        let nmr = router_with(NmrConfig::default().with_sync_delivery(true));
        nmr.endpoint_registry().register(EchoEndpoint::new(), named("echo"));
        let silent = Arc::new(SilentEndpoint::default());
        nmr.endpoint_registry()
            .register(silent.clone(), named("silent"));

        thread::scope(|scope| {
            for _ in 0..THREADS {
                let nmr = &nmr;
                scope.spawn(move || {
                    let client = nmr.create_channel();
                    for _ in 0..ROUNDS {
                        // Synchronous delivery answers within the send itself.
                        let answered = request(&client, Pattern::InOut, "echo", "now").unwrap();
                        assert!(client
                            .send_sync_timeout(&answered, Duration::ZERO)
                            .unwrap());

                        let ignored = request(&client, Pattern::InOut, "silent", "never").unwrap();
                        assert!(!client
                            .send_sync_timeout(&ignored, Duration::ZERO)
                            .unwrap());
                    }
                });
            }
        });

        assert_eq!(
            silent.received.load(Ordering::SeqCst),
            THREADS * ROUNDS
        );
    }
}

//! # NMR Dispatch Benchmarks
//!
//! | Group | Measures |
//! |-------|----------|
//! | round-trip | InOut `send_sync` + Done close, executor vs synchronous delivery |
//! | resolution | Target resolution against a populated registry |
//! | filter | LDAP filter parsing and matching |
//! | authorization | ACL fold, fresh and cached |

#![allow(clippy::unwrap_used)]

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use nmr_core::{
    AuthorizationRegistry, AuthorizationType, Filter, Nmr, NmrConfig, Pattern, Principal,
    Properties, QName, SimpleAuthorizationEntry, Status, Subject,
};
use nmr_tests::fixtures::{named, request, EchoEndpoint};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Round trip
// ============================================================================

fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("round-trip");
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(1));

    for (label, sync_delivery) in [("executor", false), ("sync-delivery", true)] {
        let nmr = Nmr::new(NmrConfig::default().with_sync_delivery(sync_delivery)).unwrap();
        nmr.endpoint_registry().register(EchoEndpoint::new(), named("echo"));
        let client = nmr.create_channel();

        group.bench_function(BenchmarkId::new("in-out", label), |b| {
            b.iter(|| {
                let exchange = request(&client, Pattern::InOut, "echo", "payload").unwrap();
                assert!(client.send_sync(&exchange).unwrap());
                exchange.set_status(Status::Done).unwrap();
                client.send(black_box(&exchange)).unwrap();
            })
        });
    }

    group.finish();
}

// ============================================================================
// Target resolution
// ============================================================================

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");

    for size in [10, 100, 1000] {
        let nmr = Nmr::new(NmrConfig::default()).unwrap();
        for i in 0..size {
            nmr.endpoint_registry().register(
                EchoEndpoint::new(),
                named(&format!("ep-{i}")).with("tier", if i % 2 == 0 { "even" } else { "odd" }),
            );
        }
        let by_name = Properties::from([(Properties::NAME, format!("ep-{}", size - 1))]);
        let by_filter = Filter::parse(&format!("(&(tier=odd)(NAME=ep-{}*))", size - 1)).unwrap();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("properties", size), &by_name, |b, query| {
            b.iter(|| black_box(nmr.endpoint_registry().query(query).len()))
        });
        group.bench_with_input(BenchmarkId::new("filter", size), &by_filter, |b, filter| {
            b.iter(|| black_box(nmr.endpoint_registry().query_filter(filter).len()))
        });
    }

    group.finish();
}

// ============================================================================
// Filters
// ============================================================================

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");
    let expression = "(&(SERVICE_NAME={urn:demo}Echo)(|(version>=2)(!(stage=beta)))(NAME=ec*o))";
    let filter = Filter::parse(expression).unwrap();
    let properties = Properties::new()
        .with(Properties::NAME, "echo")
        .with(Properties::SERVICE_NAME, "{urn:demo}Echo")
        .with("version", "3");

    group.bench_function("parse", |b| {
        b.iter(|| Filter::parse(black_box(expression)).unwrap())
    });
    group.bench_function("match", |b| {
        b.iter(|| black_box(filter.matches(black_box(&properties))))
    });

    group.finish();
}

// ============================================================================
// Authorization
// ============================================================================

fn authorization_registry() -> AuthorizationRegistry {
    let registry = AuthorizationRegistry::new();
    let mut types = [
        AuthorizationType::Add,
        AuthorizationType::Add,
        AuthorizationType::Remove,
        AuthorizationType::Set,
    ];
    let mut rng = rand::thread_rng();
    for i in 0..64 {
        types.shuffle(&mut rng);
        registry
            .register(Arc::new(
                SimpleAuthorizationEntry::new(
                    types[0],
                    format!("svc-{}.*", i % 8),
                    None,
                    &format!("role-{i}, role-{}", i + 1),
                )
                .with_rank(i % 4),
            ))
            .unwrap();
    }
    registry
}

fn bench_authorization(c: &mut Criterion) {
    let mut group = c.benchmark_group("authorization");
    let operation = QName::new("urn:demo", "invoke");
    let subject = Subject::new([Principal::new("role-7")]);

    let registry = authorization_registry();
    group.bench_function("cached", |b| {
        b.iter(|| {
            black_box(registry.is_authorized("svc-3-primary", Some(&operation), Some(&subject)))
        })
    });

    group.bench_function("fold", |b| {
        b.iter_batched(
            authorization_registry,
            |registry| {
                black_box(registry.is_authorized("svc-3-primary", Some(&operation), Some(&subject)))
            },
            BatchSize::LargeInput,
        )
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_round_trip,
    bench_resolution,
    bench_filter,
    bench_authorization
);
criterion_main!(benches);

//! Benchmarks for slot lookup and room fan-out

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ready_room::broadcast::{ConnectionRegistry, RoomBroadcaster};
use ready_room::lobby::slots;
use ready_room::types::{LobbyType, Notification, Team};
use ready_room::utils::generate_connection_id;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

fn bench_slot_lookup(c: &mut Criterion) {
    c.bench_function("slot_for_highlander", |b| {
        b.iter(|| {
            slots::slot_for(
                black_box(LobbyType::Highlander),
                black_box(Team::Blu),
                black_box("sniper"),
            )
        })
    });

    c.bench_function("slot_info_sixes", |b| {
        b.iter(|| slots::slot_info(black_box(LobbyType::Sixes), black_box(7)))
    });
}

fn bench_room_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("room_publish");

    for subscriber_count in [10usize, 100, 1000] {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = RoomBroadcaster::new(Arc::clone(&registry));

        // Keep receivers alive so sends succeed
        let mut receivers = Vec::with_capacity(subscriber_count);
        for i in 0..subscriber_count {
            let (tx, rx) = mpsc::unbounded_channel();
            let connection = generate_connection_id();
            broadcaster
                .register_connection(connection, Some(format!("player{}", i)), tx)
                .unwrap();
            registry.subscribe(connection, "1_public").unwrap();
            receivers.push(rx);
        }

        let message = Notification::event("lobbyData", json!({"id": 1, "state": "waiting"}));
        group.bench_with_input(
            BenchmarkId::from_parameter(subscriber_count),
            &subscriber_count,
            |b, &count| {
                b.iter(|| {
                    let delivered = broadcaster.publish("1_public", black_box(&message)).unwrap();
                    assert_eq!(delivered, count);
                    // Drain so queues stay bounded across iterations
                    for rx in receivers.iter_mut() {
                        while rx.try_recv().is_ok() {}
                    }
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_slot_lookup, bench_room_fanout);
criterion_main!(benches);

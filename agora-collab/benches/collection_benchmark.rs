use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use agora_collab::store::memory::{MemoryCollection, MemoryPeer, ReplicaNetwork, StoreConfig};
use agora_collab::{
    AccessPolicy, CollectionHandle, CollectionManager, CollectionOptions, ConflictPolicy, Database, Notifier,
};
use agora_core::{EntryMeta, Message};
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// A collection pre-filled with `count` messages.
fn filled_collection(rt: &Runtime, count: usize) -> MemoryCollection {
    rt.block_on(async {
        let network = Arc::new(ReplicaNetwork::new(StoreConfig::default()));
        let peer = MemoryPeer::new(network, "bench");
        peer.connect();
        let db = peer.open_database("agora").unwrap();
        let handle = db
            .open_collection(
                "debate-d1-messages-for",
                CollectionOptions::new(AccessPolicy::ReadWrite, ConflictPolicy::LastWriteWins),
            )
            .await
            .unwrap();
        for i in 0..count {
            handle
                .insert_one(json!({ "description": format!("message {i}") }))
                .await
                .unwrap();
        }
        handle
    })
}

fn bench_refresh(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("Snapshot Refresh");

    for size in [100usize, 1_000] {
        let handle = filled_collection(&rt, size);
        let manager = CollectionManager::<Message, MemoryCollection>::new();
        manager.bind(handle.clone()).unwrap();

        // Rewrites one record, so the size stays fixed while every insert
        // triggers a full re-read.
        let mut message = Message::new("bench");
        message.meta = EntryMeta::with_id("bench");
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("insert_and_refresh_{size}"), |b| {
            b.iter(|| {
                rt.block_on(manager.insert(black_box(&message))).unwrap();
            })
        });
        manager.close();
    }

    group.finish();
}

fn bench_notify(c: &mut Criterion) {
    let notifier = Notifier::new();
    let subscriptions: Vec<_> = (0..100).map(|_| notifier.subscribe(|| {})).collect();

    c.bench_function("notify_100_listeners", |b| {
        b.iter(|| notifier.notify_all())
    });

    for subscription in subscriptions {
        subscription.unsubscribe();
    }
}

criterion_group!(benches, bench_refresh, bench_notify);
criterion_main!(benches);

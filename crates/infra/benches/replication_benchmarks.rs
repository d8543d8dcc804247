use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::time::Duration;

use userlink_auth::InMemoryCredentialStore;
use userlink_core::{User, UserId};
use userlink_events::{InMemoryBroker, decode_user_id, encode_user_id};
use userlink_infra::read_model::InMemoryReplicaStore;
use userlink_infra::workers::{ReplicationConsumer, ReplicationProducer};

const TOPIC: &str = "users.ids";

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn seeded_store(n: i64) -> InMemoryCredentialStore {
    let store = InMemoryCredentialStore::new();
    for id in 1..=n {
        store
            .insert_with_id(User::new(UserId::new(id), format!("user{id}"), b"h".to_vec()))
            .unwrap();
    }
    store
}

fn bench_codec(c: &mut Criterion) {
    c.bench_function("codec_encode_decode", |b| {
        b.iter(|| {
            let bytes = encode_user_id(black_box(UserId::new(0x0102_0304_0506_0708)));
            black_box(decode_user_id(&bytes).unwrap())
        })
    });
}

/// First tick publishes everything; steady-state ticks only pay for the listing.
fn bench_producer_tick(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("producer_tick");

    for users in [100_i64, 1_000, 10_000] {
        let store = seeded_store(users);
        group.throughput(Throughput::Elements(users as u64));

        group.bench_with_input(BenchmarkId::new("cold", users), &users, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    let mut producer = ReplicationProducer::new(
                        store.clone(),
                        InMemoryBroker::new(),
                        TOPIC,
                        Duration::from_secs(5),
                    );
                    black_box(producer.tick().await.unwrap())
                })
            })
        });

        let mut warm = ReplicationProducer::new(
            store.clone(),
            InMemoryBroker::new(),
            TOPIC,
            Duration::from_secs(5),
        );
        rt.block_on(warm.tick()).unwrap();
        group.bench_with_input(BenchmarkId::new("steady", users), &users, |b, _| {
            b.iter(|| black_box(rt.block_on(warm.tick()).unwrap()))
        });
    }

    group.finish();
}

fn bench_consumer_ingest(c: &mut Criterion) {
    let rt = runtime();
    let replica = InMemoryReplicaStore::new();
    let consumer = ReplicationConsumer::new(replica, InMemoryBroker::new(), TOPIC);
    let payload = encode_user_id(UserId::new(42));

    rt.block_on(consumer.ingest(&payload)).unwrap();
    c.bench_function("consumer_ingest_duplicate", |b| {
        b.iter(|| black_box(rt.block_on(consumer.ingest(black_box(&payload))).unwrap()))
    });
}

criterion_group!(benches, bench_codec, bench_producer_tick, bench_consumer_ingest);
criterion_main!(benches);

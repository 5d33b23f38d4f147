//! Benchmarks for per-packet routing hot paths.
//!
//! These benchmarks measure performance of:
//! - Header parsing (long and short form)
//! - CID decoding for each codec kind
//! - Full dispatch, with and without the connection cache
//! - CID generation
//!
//! Run with: cargo bench -p quiclb-core --bench routing_benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use quiclb_core::{
    parse_header, CidCodec, CidConfig, CidGenerator, CidKey, Dispatcher, Endpoint, EpochStore,
    EpochStoreConfig, ServerId, ServerPool,
};
use std::sync::Arc;

const KEY: CidKey = CidKey::new([0x5A; 16]);

fn configs() -> Vec<(&'static str, CidConfig)> {
    vec![
        ("plaintext", CidConfig::plaintext(1, 16, 48)),
        ("stream", CidConfig::stream(1, 2, 6, KEY)),
        ("block_single", CidConfig::block(1, 2, 6, 8, KEY)),
        ("block_feistel", CidConfig::block(1, 2, 2, 4, KEY)),
    ]
}

/// Pre-mint CIDs for servers 0..256 with distinct nonces
fn minted(codec: &CidCodec) -> Vec<Vec<u8>> {
    (0..256u64)
        .map(|i| {
            let nonce = vec![i as u8; codec.nonce_len()];
            codec.mint(&ServerId::from_u64(i, 16), &nonce).unwrap()
        })
        .collect()
}

/// Benchmark header parsing (per-packet hot path)
fn bench_header_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("header_parsing");
    group.throughput(Throughput::Elements(1));

    let mut short = vec![0x41];
    short.extend_from_slice(&[0x40; 8]);
    short.extend_from_slice(&[0xAA; 1200]);

    group.bench_function("short", |b| {
        b.iter(|| parse_header(black_box(&short), black_box(8)))
    });

    let mut long = vec![0xC0, 0x00, 0x00, 0x00, 0x01, 8];
    long.extend_from_slice(&[0x40; 8]);
    long.push(8);
    long.extend_from_slice(&[0x11; 8]);
    long.extend_from_slice(&[0xAA; 1200]);

    group.bench_function("long", |b| {
        b.iter(|| parse_header(black_box(&long), black_box(0)))
    });

    group.finish();
}

/// Benchmark CID decoding for each codec kind (per-packet hot path)
fn bench_cid_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("cid_decode");

    for (name, config) in configs() {
        let codec = CidCodec::new(&config, 2).unwrap();
        let cids = minted(&codec);
        group.throughput(Throughput::Bytes(codec.cid_len() as u64));

        group.bench_function(name, |b| {
            let mut idx = 0;
            b.iter(|| {
                let cid = &cids[idx];
                idx = (idx + 1) % cids.len();
                codec.decode(black_box(cid))
            })
        });
    }

    group.finish();
}

/// Benchmark complete datagram routing
fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(1));

    let epochs = Arc::new(EpochStore::new(EpochStoreConfig::default()).unwrap());
    let epoch = epochs.install(CidConfig::stream(1, 2, 6, KEY)).unwrap();
    let pool = Arc::new(
        ServerPool::with_endpoints((0..256u64).map(|i| {
            let addr = format!("10.0.{}.{}:443", i / 256, i % 256).parse().unwrap();
            Endpoint::new(ServerId::from_u64(i, 16), addr)
        }))
        .unwrap(),
    );

    let packets: Vec<Vec<u8>> = minted(epoch.codec())
        .into_iter()
        .map(|cid| {
            let mut packet = vec![0x41];
            packet.extend_from_slice(&cid);
            packet.extend_from_slice(&[0xAA; 1200]);
            packet
        })
        .collect();
    let cid_len = epoch.codec().cid_len();

    let uncached = Dispatcher::builder(Arc::clone(&epochs), Arc::clone(&pool)).build();
    group.bench_function("short_header_stream", |b| {
        let mut idx = 0;
        b.iter(|| {
            let packet = &packets[idx];
            idx = (idx + 1) % packets.len();
            uncached.route_datagram(black_box(packet), cid_len)
        })
    });

    let cached = Dispatcher::builder(Arc::clone(&epochs), Arc::clone(&pool))
        .connection_cache(1024)
        .build();
    group.bench_function("short_header_stream_cached", |b| {
        let mut idx = 0;
        b.iter(|| {
            let packet = &packets[idx];
            idx = (idx + 1) % packets.len();
            cached.route_datagram(black_box(packet), cid_len)
        })
    });

    group.bench_function("garbage_short_header", |b| {
        let garbage = [0x41, 0xC0, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        b.iter(|| uncached.route_datagram(black_box(&garbage), cid_len))
    });

    group.finish();
}

/// Benchmark CidGenerator (per-connection path)
fn bench_cid_generator(c: &mut Criterion) {
    let mut group = c.benchmark_group("cid_generator");

    let epochs = Arc::new(EpochStore::new(EpochStoreConfig::default()).unwrap());
    epochs.install(CidConfig::block(1, 4, 4, 8, KEY)).unwrap();
    let generator = CidGenerator::new(epochs, ServerId::from_u64(42, 32));
    group.throughput(Throughput::Bytes(17));

    group.bench_function("generate_block", |b| b.iter(|| generator.generate()));

    group.finish();
}

criterion_group!(
    benches,
    bench_header_parsing,
    bench_cid_decode,
    bench_dispatch,
    bench_cid_generator,
);

criterion_main!(benches);

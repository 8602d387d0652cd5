//! # Lookup Benchmarks
//!
//! | Path | Work |
//! |------|------|
//! | found | index read, boundary check, block file read |
//! | pruned | index read, boundary check |
//! | not found | index read |
//! | merkle proof | cached tree after the first request per block |

use std::sync::Arc;

use block_storage::{
    InMemoryBlockStore, InMemoryKVStore, PruneConfig, PruneTracker, RetentionBoundary,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use node_runtime::DevnetFeeder;
use shared_types::ChainEvent;
use tx_indexing::{LookupConfig, TxIndex, TxLookupService};

const BLOCKS: u64 = 1_000;
const TXS_PER_BLOCK: u32 = 64;

fn setup() -> (TxLookupService<InMemoryKVStore>, DevnetFeeder) {
    let blocks = Arc::new(InMemoryBlockStore::new(64 * 1024));
    let boundary = Arc::new(RetentionBoundary::in_memory());
    let index = Arc::new(TxIndex::new(InMemoryKVStore::new()));

    let mut feeder = DevnetFeeder::new(TXS_PER_BLOCK);
    for _ in 0..BLOCKS {
        if let ChainEvent::BlockConnected(block) = feeder.next_block(blocks.as_ref()).unwrap() {
            index
                .record(block.height, block.block_hash, &block.transactions)
                .unwrap();
        }
    }

    let config = PruneConfig::enabled(100).with_min_blocks_to_keep(100);
    let tracker = PruneTracker::new(config, blocks.clone(), boundary.clone()).unwrap();
    tracker.prune_cycle(BLOCKS - 1).unwrap();

    let service = TxLookupService::new(index, boundary, blocks, LookupConfig::default());
    (service, feeder)
}

fn bench_lookups(c: &mut Criterion) {
    let (service, feeder) = setup();
    let boundary = service.stats().unwrap().retention_boundary;
    let (found, _) = feeder.transaction(BLOCKS - 1, 7).unwrap();
    let (pruned, _) = feeder.transaction(boundary / 2, 7).unwrap();
    let unknown = [0xEE; 32];

    let mut group = c.benchmark_group("tx-lookup");
    group.bench_function("found", |b| {
        b.iter(|| black_box(service.get_transaction(black_box(&found)).is_ok()))
    });
    group.bench_function("pruned", |b| {
        b.iter(|| black_box(service.get_transaction(black_box(&pruned)).is_err()))
    });
    group.bench_function("not_found", |b| {
        b.iter(|| black_box(service.get_transaction(black_box(&unknown)).is_err()))
    });
    group.bench_function("merkle_proof", |b| {
        b.iter(|| black_box(service.get_merkle_proof(black_box(&found)).is_ok()))
    });
    group.finish();
}

criterion_group!(benches, bench_lookups);
criterion_main!(benches);

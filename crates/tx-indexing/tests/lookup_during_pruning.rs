//! # Lookups While Pruning
//!
//! Index, tracker and lookup service sharing one block store and boundary.

use std::sync::Arc;

use block_storage::{
    BlockWriter, FileBackedKVStore, InMemoryBlockStore, InMemoryKVStore, PruneConfig, PruneTracker,
    RetentionBoundary,
};
use shared_types::{tx_id_of, FileId, IndexedTransaction, TxId};
use tx_indexing::{
    handle_api_query, ApiGatewayHandler, LookupConfig, LookupError, TxIndex, TxLookupService,
};

// =============================================================================
// TEST HELPERS
// =============================================================================

struct Harness {
    blocks: Arc<InMemoryBlockStore>,
    index: Arc<TxIndex<InMemoryKVStore>>,
    tracker: PruneTracker,
    lookup: Arc<TxLookupService<InMemoryKVStore>>,
}

fn harness(depth: u64) -> Harness {
    // 16-byte header + 4-byte prefix + 12-byte body leaves no room for a second block.
    let blocks = Arc::new(InMemoryBlockStore::new(40));
    let boundary = Arc::new(RetentionBoundary::in_memory());
    let index = Arc::new(TxIndex::new(InMemoryKVStore::new()));
    let config = PruneConfig::enabled(depth).with_min_blocks_to_keep(depth);
    let tracker = PruneTracker::new(config, blocks.clone(), boundary.clone()).unwrap();
    let lookup = Arc::new(TxLookupService::new(
        index.clone(),
        boundary,
        blocks.clone(),
        LookupConfig::default(),
    ));
    Harness {
        blocks,
        index,
        tracker,
        lookup,
    }
}

fn body(height: u64, branch: u8) -> Vec<u8> {
    let mut bytes = vec![branch; 4];
    bytes.extend_from_slice(&height.to_le_bytes());
    bytes
}

fn block_hash(height: u64, branch: u8) -> [u8; 32] {
    let mut hash = [branch; 32];
    hash[..8].copy_from_slice(&height.to_be_bytes());
    hash
}

/// Append and index one single-transaction block.
fn connect(h: &Harness, height: u64, branch: u8) -> TxId {
    let raw = body(height, branch);
    let location = h.blocks.append_block(height, &[raw.clone()]).unwrap()[0];
    let tx = IndexedTransaction {
        tx_id: tx_id_of(&raw),
        location,
    };
    h.index.record(height, block_hash(height, branch), &[tx]).unwrap();
    tx.tx_id
}

fn build_chain(h: &Harness, tip: u64) -> Vec<TxId> {
    (0..=tip).map(|height| connect(h, height, 0)).collect()
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[test]
fn test_depth_ten_at_tip_one_hundred() {
    let h = harness(10);
    let ids = build_chain(&h, 100);

    let outcome = h.tracker.prune_cycle(100).unwrap();
    assert_eq!(outcome.boundary_before, 0);
    assert_eq!(outcome.boundary_after, 91);
    assert_eq!(outcome.files_deleted.len(), 91);
    assert!(outcome.failures.is_empty());

    assert_eq!(
        h.lookup.get_transaction(&ids[85]),
        Err(LookupError::Pruned {
            tx_id: ids[85],
            block_height: 85
        })
    );
    assert_eq!(h.lookup.get_transaction(&ids[95]).unwrap(), body(95, 0));
    assert_eq!(h.lookup.get_transaction(&ids[91]).unwrap(), body(91, 0));
    assert_eq!(
        h.lookup.get_transaction(&[0xEE; 32]),
        Err(LookupError::NotFound { tx_id: [0xEE; 32] })
    );

    // entries for pruned blocks stay in the index
    assert_eq!(h.index.stats().unwrap().indexed_transactions, 101);
}

#[test]
fn test_repeat_cycle_is_a_noop() {
    let h = harness(10);
    build_chain(&h, 100);

    h.tracker.prune_cycle(100).unwrap();
    let again = h.tracker.prune_cycle(100).unwrap();
    assert!(again.is_noop());
    assert_eq!(again.boundary_after, 91);
}

#[test]
fn test_boundary_never_moves_back() {
    let h = harness(10);
    build_chain(&h, 100);
    h.tracker.prune_cycle(100).unwrap();

    let earlier = h.tracker.prune_cycle(50).unwrap();
    assert_eq!(earlier.boundary_after, 91);
    assert_eq!(h.lookup.stats().unwrap().retention_boundary, 91);
}

#[test]
fn test_reorg_serves_replacement_bytes() {
    let h = harness(10);
    let ids = build_chain(&h, 100);
    h.tracker.prune_cycle(100).unwrap();

    // Replace the tip with a block from another branch.
    let raw = body(100, 7);
    let location = h.blocks.append_block(100, &[raw.clone()]).unwrap()[0];
    let replacement = IndexedTransaction {
        tx_id: tx_id_of(&raw),
        location,
    };
    h.index
        .rewrite(100, block_hash(100, 7), &[replacement])
        .unwrap();

    assert_eq!(h.lookup.get_transaction(&replacement.tx_id).unwrap(), raw);
    assert_eq!(
        h.lookup.get_transaction(&ids[100]),
        Err(LookupError::NotFound { tx_id: ids[100] })
    );
}

#[test]
fn test_disconnect_then_connect() {
    let h = harness(10);
    let ids = build_chain(&h, 20);

    h.index.remove(20).unwrap();
    h.index.remove(19).unwrap();
    let best = h.index.best_block().unwrap().unwrap();
    assert_eq!(best.height, 18);
    assert_eq!(best.block_hash, block_hash(18, 0));

    let new19 = connect(&h, 19, 3);
    let new20 = connect(&h, 20, 3);
    assert_eq!(h.lookup.get_transaction(&new19).unwrap(), body(19, 3));
    assert_eq!(h.lookup.get_transaction(&new20).unwrap(), body(20, 3));
    assert!(matches!(
        h.lookup.get_transaction(&ids[19]),
        Err(LookupError::NotFound { .. })
    ));
}

#[test]
fn test_failed_delete_keeps_data_readable_until_retry() {
    let h = harness(10);
    let ids = build_chain(&h, 100);
    h.blocks.fail_deletes_for(FileId(40));

    let outcome = h.tracker.prune_cycle(100).unwrap();
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.boundary_after, 40);
    assert_eq!(h.lookup.get_transaction(&ids[40]).unwrap(), body(40, 0));
    assert!(matches!(
        h.lookup.get_transaction(&ids[39]),
        Err(LookupError::Pruned { .. })
    ));
    // Above the pinned boundary but already deleted: the read decides.
    assert!(matches!(
        h.lookup.get_transaction(&ids[60]),
        Err(LookupError::Pruned { block_height: 60, .. })
    ));

    h.blocks.clear_delete_failures();
    let retry = h.tracker.prune_cycle(100).unwrap();
    assert_eq!(retry.files_deleted, vec![FileId(40)]);
    assert_eq!(retry.boundary_after, 91);
}

#[test]
fn test_query_handler_codes_after_pruning() {
    let h = harness(10);
    let ids = build_chain(&h, 100);
    h.tracker.prune_cycle(100).unwrap();
    let handler = ApiGatewayHandler::new(h.lookup.clone());

    let pruned = handle_api_query(
        &handler,
        "getrawtransaction",
        &serde_json::json!({ "txid": hex::encode(ids[85]) }),
    )
    .unwrap_err();
    assert_eq!(pruned.code, -1);

    let found = handle_api_query(
        &handler,
        "getrawtransaction",
        &serde_json::json!({ "txid": hex::encode(ids[95]) }),
    )
    .unwrap();
    assert_eq!(found["hex"], hex::encode(body(95, 0)));

    let proof = handle_api_query(
        &handler,
        "getmerkleproof",
        &serde_json::json!({ "txid": hex::encode(ids[95]) }),
    )
    .unwrap();
    assert_eq!(proof["block_height"], 95);

    let missing = handle_api_query(
        &handler,
        "getrawtransaction",
        &serde_json::json!({ "txid": hex::encode([0xEE; 32]) }),
    )
    .unwrap_err();
    assert_eq!(missing.code, -5);
}

#[test]
fn test_index_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("txindex.log");
    let blocks = Arc::new(InMemoryBlockStore::new(40));

    let raw = body(0, 0);
    let location = blocks.append_block(0, &[raw.clone()]).unwrap()[0];
    let tx = IndexedTransaction {
        tx_id: tx_id_of(&raw),
        location,
    };
    {
        let index = TxIndex::new(FileBackedKVStore::open(&path).unwrap());
        index.record(0, block_hash(0, 0), &[tx]).unwrap();
        index.flush().unwrap();
    }

    let index = Arc::new(TxIndex::new(FileBackedKVStore::open(&path).unwrap()));
    let lookup = TxLookupService::new(
        index,
        Arc::new(RetentionBoundary::in_memory()),
        blocks,
        LookupConfig::default(),
    );
    assert_eq!(lookup.get_transaction(&tx.tx_id).unwrap(), raw);
    assert_eq!(lookup.stats().unwrap().index.indexed_transactions, 1);
}

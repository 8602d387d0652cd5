//! # Lookups Across Pruning and Reorgs
//!
//! A running node with txindex and pruning both enabled, fed by the devnet
//! feeder, one block per file.
//!
//! ```text
//! heights   0 ........ 85 ........ 90 | 91 ........ 100
//!           [ deleted block files     ] [ retained files ]
//!                                     ^ boundary after prune at tip 100, depth 10
//! ```
//!
//! Every transaction below the boundary is still in the index and answers
//! `Pruned`; identifiers never indexed answer `NotFound`.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use block_storage::{BlockStore, BlockWriter};
    use node_runtime::{DevnetFeeder, Node, NodeConfig};
    use shared_types::{tx_id_of, BlockHash, ChainEvent, ConnectedBlock, IndexedTransaction};
    use tempfile::TempDir;
    use tx_indexing::{handle_api_query, LookupError, TransactionLookupApi};

    use crate::integration::fixtures::{feed, pruning_config, reorg, start};

    /// Append a block with exactly `bodies` and describe it for the index.
    fn hand_built(node: &Node, height: u64, block_hash: BlockHash, bodies: &[&[u8]]) -> ConnectedBlock {
        let bodies: Vec<Vec<u8>> = bodies.iter().map(|b| b.to_vec()).collect();
        let locations = node.services().blocks.append_block(height, &bodies).unwrap();
        ConnectedBlock {
            height,
            block_hash,
            transactions: bodies
                .iter()
                .zip(locations)
                .map(|(body, location)| IndexedTransaction {
                    tx_id: tx_id_of(body),
                    location,
                })
                .collect(),
        }
    }

    // =============================================================================
    // PRUNED VS NOT FOUND
    // =============================================================================

    #[tokio::test]
    async fn test_pruned_and_not_found_stay_distinct() {
        let dir = TempDir::new().unwrap();
        let node = start(pruning_config(&dir));
        let mut feeder = DevnetFeeder::new(1);
        feed(&node, &mut feeder, 101).await;

        let outcome = node.prune_to_height(100).await.unwrap();
        assert_eq!(outcome.boundary_after, 91);
        assert_eq!(outcome.files_deleted.len(), 91);
        assert!(outcome.failures.is_empty());

        let lookup = node.lookup().unwrap();
        let (pruned, _) = feeder.transaction(85, 0).unwrap();
        let (retained, bytes) = feeder.transaction(95, 0).unwrap();
        let unknown = [0xEE; 32];

        assert_eq!(
            lookup.get_transaction(&pruned),
            Err(LookupError::Pruned {
                tx_id: pruned,
                block_height: 85
            })
        );
        assert_eq!(lookup.get_transaction(&retained).unwrap(), bytes);
        assert_eq!(
            lookup.get_transaction(&unknown),
            Err(LookupError::NotFound { tx_id: unknown })
        );

        // Entries below the boundary are never dropped from the index.
        let stats = lookup.stats().unwrap();
        assert_eq!(stats.index.indexed_transactions, 101);
        assert_eq!(stats.retention_boundary, 91);

        node.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_entry_and_proof_follow_the_boundary() {
        let dir = TempDir::new().unwrap();
        let node = start(pruning_config(&dir));
        let mut feeder = DevnetFeeder::new(3);
        feed(&node, &mut feeder, 101).await;
        node.prune_to_height(100).await.unwrap();

        let lookup = node.lookup().unwrap();
        let (pruned, _) = feeder.transaction(90, 2).unwrap();
        let (boundary_tx, _) = feeder.transaction(91, 2).unwrap();

        assert!(matches!(lookup.get_entry(&pruned), Err(LookupError::Pruned { .. })));
        assert!(matches!(
            lookup.get_merkle_proof(&pruned),
            Err(LookupError::Pruned { .. })
        ));

        let entry = lookup.get_entry(&boundary_tx).unwrap();
        assert_eq!((entry.block_height, entry.position), (91, 2));
        let proof = lookup.get_merkle_proof(&boundary_tx).unwrap();
        assert!(proof.verify());

        node.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_lost_block_file_reads_as_pruned() {
        let dir = TempDir::new().unwrap();
        let node = start(pruning_config(&dir));
        let mut feeder = DevnetFeeder::new(1);
        feed(&node, &mut feeder, 20).await;

        let blocks = &node.services().blocks;
        let file = blocks
            .block_files()
            .unwrap()
            .into_iter()
            .find(|f| f.first_height == 12)
            .unwrap();
        std::fs::remove_file(blocks.dir().join(format!("{}.dat", file.file_id))).unwrap();

        let (tx_id, _) = feeder.transaction(12, 0).unwrap();
        assert!(matches!(
            node.lookup().unwrap().get_transaction(&tx_id),
            Err(LookupError::Pruned { block_height: 12, .. })
        ));
        // Retention boundary is untouched.
        assert_eq!(node.services().boundary.current(), 0);

        node.shutdown().await.unwrap();
    }

    // =============================================================================
    // CYCLES
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_automatic_cycle_advances_boundary() {
        let dir = TempDir::new().unwrap();
        let node = start(NodeConfig {
            prune_interval: Duration::from_secs(60),
            ..pruning_config(&dir)
        });
        let mut feeder = DevnetFeeder::new(1);
        feed(&node, &mut feeder, 101).await;

        // Two full intervals, whatever the timer had already counted.
        tokio::time::sleep(Duration::from_secs(121)).await;
        assert_eq!(node.services().boundary.current(), 91);
        assert_eq!(node.services().blocks.block_files().unwrap().len(), 10);

        node.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_repeated_prune_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let node = start(pruning_config(&dir));
        let mut feeder = DevnetFeeder::new(1);
        feed(&node, &mut feeder, 101).await;

        node.prune_to_height(100).await.unwrap();
        let again = node.prune_to_height(100).await.unwrap();
        assert!(again.is_noop());
        assert_eq!(again.boundary_after, 91);

        node.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_manual_prune_clamped_and_monotone() {
        let dir = TempDir::new().unwrap();
        let node = start(pruning_config(&dir));
        let mut feeder = DevnetFeeder::new(1);
        feed(&node, &mut feeder, 101).await;

        let first = node.prune_to_height(40).await.unwrap();
        assert_eq!(first.boundary_after, 41);

        // Past the minimum window: clamped to tip - 10.
        let second = node.prune_to_height(99).await.unwrap();
        assert_eq!(second.boundary_after, 91);

        // A lower request never moves the boundary back.
        let third = node.prune_to_height(20).await.unwrap();
        assert_eq!(third.boundary_after, 91);
        assert!(third.is_noop());

        node.shutdown().await.unwrap();
    }

    // =============================================================================
    // REORGS
    // =============================================================================

    #[tokio::test]
    async fn test_reorg_inside_retained_window() {
        let dir = TempDir::new().unwrap();
        let node = start(pruning_config(&dir));
        let mut feeder = DevnetFeeder::new(2);
        feed(&node, &mut feeder, 101).await;
        node.prune_to_height(100).await.unwrap();

        let (replaced, _) = feeder.transaction(99, 1).unwrap();
        reorg(&node, &mut feeder, 3).await;
        let (replacement, bytes) = feeder.transaction(99, 1).unwrap();

        let lookup = node.lookup().unwrap();
        assert_eq!(lookup.get_transaction(&replacement).unwrap(), bytes);
        assert_eq!(
            lookup.get_transaction(&replaced),
            Err(LookupError::NotFound { tx_id: replaced })
        );
        assert_eq!(node.tip(), Some(100));

        let best = node.services().index.as_ref().unwrap().best_block().unwrap().unwrap();
        assert_eq!(Some((best.height, best.block_hash)), feeder.tip());

        node.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_transaction_in_both_branches_reads_from_replacement() {
        let dir = TempDir::new().unwrap();
        let node = start(pruning_config(&dir));
        feed(&node, &mut DevnetFeeder::new(1), 20).await;

        let shared: &[u8] = b"spend carried into the new branch";
        let old_only: &[u8] = b"only on the old branch";
        let old = hand_built(&node, 20, [0xB1; 32], &[old_only, shared]);
        let old_file = old.transactions[1].location.file_id;
        node.submit(ChainEvent::BlockConnected(old)).await.unwrap();
        node.submit(ChainEvent::BlockDisconnected {
            height: 20,
            block_hash: [0xB1; 32],
        })
        .await
        .unwrap();

        let new_only: &[u8] = b"only on the new branch";
        let new = hand_built(&node, 20, [0xB2; 32], &[new_only, b"filler", shared]);
        let new_location = new.transactions[2].location;
        assert_ne!(new_location.file_id, old_file);
        node.submit(ChainEvent::BlockConnected(new)).await.unwrap();
        node.sync().await.unwrap();

        // The replaced block's bytes are gone for good.
        let blocks = &node.services().blocks;
        std::fs::remove_file(blocks.dir().join(format!("{}.dat", old_file))).unwrap();

        let lookup = node.lookup().unwrap();
        let tx_id = tx_id_of(shared);
        assert_eq!(lookup.get_transaction(&tx_id).unwrap(), shared);
        let entry = lookup.get_entry(&tx_id).unwrap();
        assert_eq!(entry.location, new_location);
        assert_eq!((entry.block_hash, entry.position), ([0xB2; 32], 2));
        assert!(lookup.get_merkle_proof(&tx_id).unwrap().verify());

        let dropped = tx_id_of(old_only);
        assert_eq!(
            lookup.get_transaction(&dropped),
            Err(LookupError::NotFound { tx_id: dropped })
        );

        let handler = node.query_handler().unwrap();
        let in_new = serde_json::json!([hex::encode([0xB2; 32]), hex::encode(tx_id)]);
        let proof = handle_api_query(&handler, "getmerkleproof2", &in_new).unwrap();
        assert_eq!(proof["index"], 2);
        assert_eq!(proof["target"], hex::encode([0xB2; 32]));

        let in_old = serde_json::json!([hex::encode([0xB1; 32]), hex::encode(tx_id)]);
        let err = handle_api_query(&handler, "getmerkleproof2", &in_old).unwrap_err();
        assert_eq!(err.code, -5);

        node.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_pruning_after_reorg_uses_new_tip() {
        let dir = TempDir::new().unwrap();
        let node = start(pruning_config(&dir));
        let mut feeder = DevnetFeeder::new(1);
        feed(&node, &mut feeder, 60).await;
        reorg(&node, &mut feeder, 5).await;
        feed(&node, &mut feeder, 41).await;

        node.prune_to_height(100).await.unwrap();
        let lookup = node.lookup().unwrap();
        let (on_new_branch, bytes) = feeder.transaction(57, 0).unwrap();
        assert!(matches!(
            lookup.get_transaction(&on_new_branch),
            Err(LookupError::Pruned { block_height: 57, .. })
        ));
        let (tx_id, bytes_95) = feeder.transaction(95, 0).unwrap();
        assert_eq!(lookup.get_transaction(&tx_id).unwrap(), bytes_95);
        assert_ne!(bytes, bytes_95);

        node.shutdown().await.unwrap();
    }

    // =============================================================================
    // QUERY INTERFACE
    // =============================================================================

    #[tokio::test]
    async fn test_query_handler_reports_pruned_and_missing() {
        let dir = TempDir::new().unwrap();
        let node = start(pruning_config(&dir));
        let mut feeder = DevnetFeeder::new(1);
        feed(&node, &mut feeder, 101).await;
        node.prune_to_height(100).await.unwrap();

        let handler = node.query_handler().unwrap();
        let (pruned, _) = feeder.transaction(50, 0).unwrap();
        let (retained, bytes) = feeder.transaction(100, 0).unwrap();

        let err = handle_api_query(&handler, "getrawtransaction", &serde_json::json!([hex::encode(pruned)]))
            .unwrap_err();
        assert_eq!(err.code, -1);

        let err = handle_api_query(
            &handler,
            "getrawtransaction",
            &serde_json::json!({ "txid": hex::encode([0x42; 32]) }),
        )
        .unwrap_err();
        assert_eq!(err.code, -5);

        let found = handle_api_query(
            &handler,
            "getrawtransaction",
            &serde_json::json!({ "txid": hex::encode(retained) }),
        )
        .unwrap();
        assert_eq!(found["hex"], hex::encode(bytes));

        let metrics = handle_api_query(&handler, "get_metrics", &serde_json::Value::Null).unwrap();
        assert_eq!(metrics["retention_boundary"], 91);
        assert_eq!(metrics["lookups_pruned"], 1);
        assert_eq!(metrics["lookups_not_found"], 1);

        node.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_pruning_disabled_keeps_everything() {
        let dir = TempDir::new().unwrap();
        let node = start(NodeConfig {
            enable_pruning: false,
            ..pruning_config(&dir)
        });
        let mut feeder = DevnetFeeder::new(1);
        feed(&node, &mut feeder, 30).await;

        let lookup = node.lookup().unwrap();
        let (genesis_tx, bytes) = feeder.transaction(0, 0).unwrap();
        assert_eq!(lookup.get_transaction(&genesis_tx).unwrap(), bytes);
        assert_eq!(node.services().boundary.current(), 0);

        node.shutdown().await.unwrap();
    }
}

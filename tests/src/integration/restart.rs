//! # Restart Behavior
//!
//! What a node finds when it reopens a data directory: the persisted
//! retention boundary, the index and the chain tip. Also the lock that keeps
//! a second process out.

#[cfg(test)]
mod tests {
    use block_storage::LockError;
    use node_runtime::{DevnetFeeder, Node, NodeConfig, NodeError, NodeServices};
    use tempfile::TempDir;
    use tx_indexing::{LookupError, TransactionLookupApi};

    use crate::integration::fixtures::{feed, pruning_config, start};

    fn resume(node: &Node, txs_per_block: u32) -> DevnetFeeder {
        let best = node
            .services()
            .index
            .as_ref()
            .and_then(|index| index.best_block().unwrap())
            .unwrap();
        DevnetFeeder::resume(txs_per_block, best.height + 1, best.block_hash)
    }

    #[tokio::test]
    async fn test_boundary_and_index_survive_restart() {
        let dir = TempDir::new().unwrap();
        let mut feeder = DevnetFeeder::new(1);
        let (pruned, _) = {
            let node = start(pruning_config(&dir));
            feed(&node, &mut feeder, 101).await;
            node.prune_to_height(100).await.unwrap();
            node.shutdown().await.unwrap();
            feeder.transaction(85, 0).unwrap()
        };
        let (retained, bytes) = feeder.transaction(95, 0).unwrap();

        let node = start(pruning_config(&dir));
        assert_eq!(node.services().boundary.current(), 91);
        assert_eq!(node.tip(), Some(100));

        let lookup = node.lookup().unwrap();
        assert!(matches!(
            lookup.get_transaction(&pruned),
            Err(LookupError::Pruned { block_height: 85, .. })
        ));
        assert_eq!(lookup.get_transaction(&retained).unwrap(), bytes);
        assert_eq!(lookup.stats().unwrap().index.indexed_transactions, 101);

        node.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_chain_continues_after_restart() {
        let dir = TempDir::new().unwrap();
        {
            let node = start(pruning_config(&dir));
            feed(&node, &mut DevnetFeeder::new(2), 10).await;
            node.shutdown().await.unwrap();
        }

        let node = start(pruning_config(&dir));
        let mut feeder = resume(&node, 2);
        feed(&node, &mut feeder, 5).await;
        assert_eq!(node.tip(), Some(14));

        let (tx_id, bytes) = feeder.transaction(12, 1).unwrap();
        assert_eq!(node.lookup().unwrap().get_transaction(&tx_id).unwrap(), bytes);
        node.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_node_on_same_directory_is_refused() {
        let dir = TempDir::new().unwrap();
        let node = start(pruning_config(&dir));

        let second = NodeServices::open(pruning_config(&dir));
        assert!(matches!(
            second,
            Err(NodeError::Lock(LockError::AlreadyLocked { .. }))
        ));

        node.shutdown().await.unwrap();
        assert!(NodeServices::open(pruning_config(&dir)).is_ok());
    }

    #[tokio::test]
    async fn test_reenabling_txindex_does_not_backfill() {
        let dir = TempDir::new().unwrap();
        let mut feeder = DevnetFeeder::new(1);
        {
            let node = start(pruning_config(&dir));
            feed(&node, &mut feeder, 5).await;
            node.shutdown().await.unwrap();
        }
        {
            let node = start(NodeConfig {
                enable_txindex: false,
                ..pruning_config(&dir)
            });
            assert_eq!(node.tip(), Some(4));
            feed(&node, &mut feeder, 3).await;
            node.shutdown().await.unwrap();
        }

        let node = start(pruning_config(&dir));
        let lookup = node.lookup().unwrap();
        let (indexed, _) = feeder.transaction(4, 0).unwrap();
        let (skipped, _) = feeder.transaction(6, 0).unwrap();
        assert!(lookup.get_transaction(&indexed).is_ok());
        assert_eq!(
            lookup.get_transaction(&skipped),
            Err(LookupError::NotFound { tx_id: skipped })
        );
        // The index only knows what it saw.
        assert_eq!(node.tip(), Some(4));

        node.shutdown().await.unwrap();
    }
}

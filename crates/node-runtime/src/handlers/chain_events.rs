//! # Block-Connection Worker
//!
//! Sole writer of the transaction index. Applies [`ChainEvent`]s in arrival
//! order under the chain lock, so a reorg never interleaves with a prune
//! cycle.
//!
//! ## Flow
//!
//! 1. `BlockConnected` at a new height: `TxIndex::record`
//! 2. `BlockConnected` at the indexed tip height: `TxIndex::rewrite`
//! 3. `BlockDisconnected`: `TxIndex::remove`
//!
//! A failed index write leaves the index untouched and is retried with
//! doubling backoff before the next event is taken, so later blocks are never
//! indexed over a gap. The chain lock is released between attempts. A
//! shutdown during the retry abandons that event and everything queued
//! behind it. The chain tip follows the events, since it describes the chain
//! and block files rather than the index.

use std::sync::Arc;
use std::time::Duration;

use node_telemetry::{
    log_block_event, metric_inc, BLOCKS_RETRACTED, INDEX_WRITE_RETRIES, TRANSACTIONS_INDEXED,
};
use shared_types::{short_hex, BlockHeight, ChainEvent, ConnectedBlock};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{error, info, warn};
use tx_indexing::IndexingError;

use crate::container::NodeIndex;
use crate::shutdown::ShutdownListener;

const RETRY_INITIAL_DELAY: Duration = Duration::from_millis(100);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

/// Handler for chain notifications.
pub struct ChainEventHandler {
    receiver: mpsc::Receiver<ChainEvent>,
    /// `None` with txindex disabled; events then only move the tip.
    index: Option<Arc<NodeIndex>>,
    chain_lock: Arc<Mutex<()>>,
    tip: watch::Sender<Option<BlockHeight>>,
    /// Number of events fully handled.
    applied: watch::Sender<u64>,
    shutdown: ShutdownListener,
}

impl ChainEventHandler {
    pub fn new(
        receiver: mpsc::Receiver<ChainEvent>,
        index: Option<Arc<NodeIndex>>,
        chain_lock: Arc<Mutex<()>>,
        tip: watch::Sender<Option<BlockHeight>>,
        applied: watch::Sender<u64>,
        shutdown: ShutdownListener,
    ) -> Self {
        Self {
            receiver,
            index,
            chain_lock,
            tip,
            applied,
            shutdown,
        }
    }

    /// Run until shutdown, then apply whatever is already queued.
    pub async fn run(mut self) {
        info!("[txindex] block-connection worker started");

        loop {
            let event = tokio::select! {
                biased;
                event = self.receiver.recv() => event,
                _ = self.shutdown.wait() => break,
            };
            let Some(event) = event else {
                info!("[txindex] event channel closed, exiting");
                return;
            };
            if let Err(e) = self.handle(event).await {
                error!(error = %e, "[txindex] shut down while retrying, chain event not indexed");
                return;
            }
        }

        self.receiver.close();
        let mut drained = 0usize;
        while let Some(event) = self.receiver.recv().await {
            if let Err(e) = self.handle(event).await {
                error!(
                    drained,
                    error = %e,
                    "[txindex] index write failed during shutdown, remaining events not indexed"
                );
                return;
            }
            drained += 1;
        }
        info!(drained, "[txindex] block-connection worker stopped");
    }

    /// Apply one event, retrying until it succeeds. `Err` carries the last
    /// failure when shutdown cut the retry short.
    async fn handle(&self, event: ChainEvent) -> Result<(), IndexingError> {
        let mut shutdown = self.shutdown.clone();
        let mut delay = RETRY_INITIAL_DELAY;
        let mut attempt = 1u32;

        while let Err(e) = self.apply(&event).await {
            metric_inc!(INDEX_WRITE_RETRIES);
            error!(
                height = event.height(),
                attempt,
                retry_in_ms = delay.as_millis() as u64,
                error = %e,
                "[txindex] failed to apply chain event, index unchanged"
            );
            tokio::select! {
                biased;
                _ = shutdown.wait() => return Err(e),
                _ = tokio::time::sleep(delay) => {}
            }
            delay = (delay * 2).min(RETRY_MAX_DELAY);
            attempt += 1;
        }

        self.applied.send_modify(|n| *n += 1);
        Ok(())
    }

    async fn apply(&self, event: &ChainEvent) -> Result<(), IndexingError> {
        let _chain = self.chain_lock.lock().await;

        match event {
            ChainEvent::BlockConnected(block) => {
                self.tip.send_replace(Some(block.height));
                self.connect(block)
            }
            ChainEvent::BlockDisconnected { height, block_hash } => {
                self.tip.send_replace(height.checked_sub(1));
                self.disconnect(*height, block_hash)
            }
        }
    }

    fn connect(&self, block: &ConnectedBlock) -> Result<(), IndexingError> {
        let Some(index) = &self.index else {
            return Ok(());
        };

        let replaces_tip = index
            .best_block()?
            .is_some_and(|best| best.height == block.height);
        let written = if replaces_tip {
            index.rewrite(block.height, block.block_hash, &block.transactions)?
        } else {
            index.record(block.height, block.block_hash, &block.transactions)?
        };

        TRANSACTIONS_INDEXED.inc_by(written as f64);
        log_block_event!(
            info,
            "txindex",
            "block indexed",
            block.height,
            short_hex(&block.block_hash),
            transactions = written,
            replaced = replaces_tip
        );
        Ok(())
    }

    fn disconnect(&self, height: BlockHeight, block_hash: &[u8; 32]) -> Result<(), IndexingError> {
        let Some(index) = &self.index else {
            return Ok(());
        };

        if let Some(best) = index.best_block()? {
            if best.height != height || &best.block_hash != block_hash {
                warn!(
                    height,
                    block = %short_hex(block_hash),
                    best_height = best.height,
                    best_block = %short_hex(&best.block_hash),
                    "[txindex] disconnecting a block that is not the indexed tip"
                );
            }
        }

        let removed = index.remove(height)?;
        metric_inc!(BLOCKS_RETRACTED);
        log_block_event!(
            info,
            "txindex",
            "block retracted",
            height,
            short_hex(block_hash),
            removed = removed
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::Shutdown;
    use block_storage::{BatchOperation, InMemoryKVStore, KVStoreError, KeyValueStore, ScanResult};
    use std::sync::atomic::{AtomicBool, Ordering};
    use shared_types::{FileId, IndexedTransaction, TransactionLocation};
    use tx_indexing::TxIndex;

    fn block(height: u64, branch: u8, ids: &[u8]) -> ChainEvent {
        ChainEvent::BlockConnected(ConnectedBlock {
            height,
            block_hash: [branch; 32],
            transactions: ids
                .iter()
                .enumerate()
                .map(|(i, id)| IndexedTransaction {
                    tx_id: [*id; 32],
                    location: TransactionLocation::new(FileId(height as u32), i as u64 * 10, 10),
                })
                .collect(),
        })
    }

    struct Harness {
        events: mpsc::Sender<ChainEvent>,
        index: Arc<NodeIndex>,
        tip: watch::Receiver<Option<BlockHeight>>,
        applied: watch::Receiver<u64>,
        shutdown: Shutdown,
        worker: tokio::task::JoinHandle<()>,
    }

    fn spawn_with(store: Box<dyn KeyValueStore>) -> Harness {
        let (events, receiver) = mpsc::channel(16);
        let index = Arc::new(TxIndex::new(store));
        let (tip_tx, tip) = watch::channel(None);
        let (applied_tx, applied) = watch::channel(0);
        let shutdown = Shutdown::new();
        let handler = ChainEventHandler::new(
            receiver,
            Some(index.clone()),
            Arc::new(Mutex::new(())),
            tip_tx,
            applied_tx,
            shutdown.listener(),
        );
        Harness {
            events,
            index,
            tip,
            applied,
            shutdown,
            worker: tokio::spawn(handler.run()),
        }
    }

    fn spawn() -> Harness {
        spawn_with(Box::new(InMemoryKVStore::new()))
    }

    async fn wait_applied(h: &mut Harness, n: u64) {
        h.applied.wait_for(|applied| *applied >= n).await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_indexes_and_moves_tip() {
        let mut h = spawn();
        h.events.send(block(0, 1, &[10, 11])).await.unwrap();
        h.events.send(block(1, 1, &[12])).await.unwrap();
        wait_applied(&mut h, 2).await;

        assert_eq!(*h.tip.borrow(), Some(1));
        let entry = h.index.lookup(&[11; 32]).unwrap().unwrap();
        assert_eq!((entry.block_height, entry.position), (0, 1));
    }

    #[tokio::test]
    async fn test_reorg_replaces_tip() {
        let mut h = spawn();
        h.events.send(block(0, 1, &[10])).await.unwrap();
        h.events.send(block(1, 1, &[20])).await.unwrap();
        h.events
            .send(ChainEvent::BlockDisconnected {
                height: 1,
                block_hash: [1; 32],
            })
            .await
            .unwrap();
        h.events.send(block(1, 2, &[21])).await.unwrap();
        wait_applied(&mut h, 4).await;

        assert_eq!(h.index.lookup(&[20; 32]).unwrap(), None);
        assert_eq!(h.index.lookup(&[21; 32]).unwrap().unwrap().block_hash, [2; 32]);
        assert_eq!(h.index.best_block().unwrap().unwrap().block_hash, [2; 32]);
        assert_eq!(*h.tip.borrow(), Some(1));
    }

    #[tokio::test]
    async fn test_connect_at_indexed_height_rewrites() {
        let mut h = spawn();
        h.events.send(block(0, 1, &[10])).await.unwrap();
        h.events.send(block(0, 2, &[11])).await.unwrap();
        wait_applied(&mut h, 2).await;

        assert_eq!(h.index.lookup(&[10; 32]).unwrap(), None);
        assert!(h.index.lookup(&[11; 32]).unwrap().is_some());
        assert_eq!(h.index.stats().unwrap().indexed_transactions, 1);
    }

    #[tokio::test]
    async fn test_disconnect_genesis_clears_tip() {
        let mut h = spawn();
        h.events.send(block(0, 1, &[10])).await.unwrap();
        h.events
            .send(ChainEvent::BlockDisconnected {
                height: 0,
                block_hash: [1; 32],
            })
            .await
            .unwrap();
        wait_applied(&mut h, 2).await;

        assert_eq!(*h.tip.borrow(), None);
        assert_eq!(h.index.best_block().unwrap(), None);
    }

    #[tokio::test]
    async fn test_queued_events_drain_on_shutdown() {
        let mut h = spawn();
        for height in 0..8 {
            h.events.send(block(height, 1, &[height as u8 + 1])).await.unwrap();
        }
        h.shutdown.trigger();
        (&mut h.worker).await.unwrap();

        assert_eq!(*h.applied.borrow(), 8);
        assert_eq!(h.index.best_block().unwrap().unwrap().height, 7);
    }

    /// Store whose writes can be switched off from outside the index.
    struct Flaky {
        inner: InMemoryKVStore,
        fail: Arc<AtomicBool>,
    }

    impl KeyValueStore for Flaky {
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
            self.inner.get(key)
        }

        fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
            self.inner.put(key, value)
        }

        fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
            self.inner.delete(key)
        }

        fn atomic_batch_write(&mut self, ops: Vec<BatchOperation>) -> Result<(), KVStoreError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(KVStoreError::IOError {
                    message: "disk full".into(),
                });
            }
            self.inner.atomic_batch_write(ops)
        }

        fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
            self.inner.exists(key)
        }

        fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError> {
            self.inner.prefix_scan(prefix)
        }
    }

    fn flaky() -> (Harness, Arc<AtomicBool>) {
        let fail = Arc::new(AtomicBool::new(false));
        let h = spawn_with(Box::new(Flaky {
            inner: InMemoryKVStore::new(),
            fail: fail.clone(),
        }));
        (h, fail)
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_block_is_retried_before_the_next() {
        let (mut h, fail) = flaky();
        h.events.send(block(0, 1, &[10])).await.unwrap();
        wait_applied(&mut h, 1).await;

        fail.store(true, Ordering::SeqCst);
        h.events.send(block(1, 1, &[11])).await.unwrap();
        h.events.send(block(2, 1, &[12])).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        // Block 2 waits behind the failing block 1.
        assert_eq!(*h.applied.borrow(), 1);
        assert_eq!(h.index.lookup(&[11; 32]).unwrap(), None);
        assert_eq!(h.index.lookup(&[12; 32]).unwrap(), None);
        assert_eq!(h.index.best_block().unwrap().unwrap().height, 0);
        assert_eq!(*h.tip.borrow(), Some(1));
        assert!(!h.worker.is_finished());

        fail.store(false, Ordering::SeqCst);
        wait_applied(&mut h, 3).await;
        assert_eq!(h.index.lookup(&[11; 32]).unwrap().unwrap().block_height, 1);
        assert_eq!(h.index.lookup(&[12; 32]).unwrap().unwrap().block_height, 2);
        assert_eq!(h.index.best_block().unwrap().unwrap().height, 2);
        assert_eq!(h.index.stats().unwrap().indexed_transactions, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_disconnect_retried_before_reconnect() {
        let (mut h, fail) = flaky();
        h.events.send(block(0, 1, &[10])).await.unwrap();
        h.events.send(block(1, 1, &[20])).await.unwrap();
        wait_applied(&mut h, 2).await;

        fail.store(true, Ordering::SeqCst);
        h.events
            .send(ChainEvent::BlockDisconnected {
                height: 1,
                block_hash: [1; 32],
            })
            .await
            .unwrap();
        h.events.send(block(1, 2, &[21])).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*h.tip.borrow(), Some(0));

        fail.store(false, Ordering::SeqCst);
        wait_applied(&mut h, 4).await;
        assert_eq!(h.index.lookup(&[20; 32]).unwrap(), None);
        assert_eq!(h.index.lookup(&[21; 32]).unwrap().unwrap().block_hash, [2; 32]);
        assert_eq!(h.index.stats().unwrap().indexed_transactions, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_retry_stops_without_skipping() {
        let (mut h, fail) = flaky();
        fail.store(true, Ordering::SeqCst);
        h.events.send(block(0, 1, &[10])).await.unwrap();
        h.events.send(block(1, 1, &[11])).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        h.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), &mut h.worker)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(*h.applied.borrow(), 0);
        fail.store(false, Ordering::SeqCst);
        assert_eq!(h.index.best_block().unwrap(), None);
        assert_eq!(h.index.lookup(&[11; 32]).unwrap(), None);
    }
}

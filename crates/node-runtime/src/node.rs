//! # Node
//!
//! Spawns the workers over opened [`NodeServices`] and is the handle the
//! binary, the devnet feeder and tests drive the node through.
//!
//! ## Shutdown Sequence
//!
//! 1. Signal shutdown to both workers
//! 2. Block-connection worker applies events already queued
//! 3. Flush boundary and index
//! 4. Release the data directory lock

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use block_storage::PruneOutcome;
use shared_types::{BlockHeight, ChainEvent};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};
use tx_indexing::ApiGatewayHandler;

use crate::adapters::MeteredLookup;
use crate::container::{NodeLookupService, NodeServices};
use crate::error::NodeError;
use crate::handlers::{ChainEventHandler, PruneHandler, PruneRequest};
use crate::shutdown::Shutdown;

/// Lookup port as served to callers: metered, over the shared service.
pub type NodeLookup = MeteredLookup<Arc<NodeLookupService>>;

const PRUNE_REQUEST_CAPACITY: usize = 16;

pub struct Node {
    services: Arc<NodeServices>,
    events: mpsc::Sender<ChainEvent>,
    submitted: AtomicU64,
    applied: watch::Receiver<u64>,
    tip: watch::Receiver<Option<BlockHeight>>,
    prune_requests: mpsc::Sender<PruneRequest>,
    shutdown: Shutdown,
    workers: Vec<(&'static str, JoinHandle<()>)>,
}

impl Node {
    /// Spawn the workers. Must be called inside a Tokio runtime.
    pub fn start(services: NodeServices) -> Result<Self, NodeError> {
        let services = Arc::new(services);
        let tip_height = services.chain_tip()?;
        let chain_lock = Arc::new(Mutex::new(()));
        let shutdown = Shutdown::new();

        let (events, events_rx) = mpsc::channel(services.config.event_channel_capacity);
        let (tip_tx, tip) = watch::channel(tip_height);
        let (applied_tx, applied) = watch::channel(0);
        let (prune_requests, prune_rx) = mpsc::channel(PRUNE_REQUEST_CAPACITY);

        let chain_worker = ChainEventHandler::new(
            events_rx,
            services.index.clone(),
            chain_lock.clone(),
            tip_tx,
            applied_tx,
            shutdown.listener(),
        );
        let prune_worker = PruneHandler::new(
            services.tracker.clone(),
            chain_lock,
            tip.clone(),
            prune_rx,
            services.config.prune_interval,
            shutdown.listener(),
        );

        let workers = vec![
            ("block-connection", tokio::spawn(chain_worker.run())),
            ("prune", tokio::spawn(prune_worker.run())),
        ];

        info!(
            tip = ?tip_height,
            boundary = services.boundary.current(),
            "node started"
        );

        Ok(Self {
            services,
            events,
            submitted: AtomicU64::new(0),
            applied,
            tip,
            prune_requests,
            shutdown,
            workers,
        })
    }

    pub fn services(&self) -> &Arc<NodeServices> {
        &self.services
    }

    /// Last height the block-connection worker saw.
    pub fn tip(&self) -> Option<BlockHeight> {
        *self.tip.borrow()
    }

    /// `None` with txindex disabled.
    pub fn lookup(&self) -> Option<NodeLookup> {
        self.services.lookup.clone().map(MeteredLookup::new)
    }

    /// JSON query handler over [`lookup`](Self::lookup).
    pub fn query_handler(&self) -> Option<ApiGatewayHandler<NodeLookup>> {
        self.lookup().map(ApiGatewayHandler::new)
    }

    /// Queue a chain event for the block-connection worker.
    pub async fn submit(&self, event: ChainEvent) -> Result<(), NodeError> {
        self.events
            .send(event)
            .await
            .map_err(|_| NodeError::WorkerStopped {
                worker: "block-connection",
            })?;
        self.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Wait until every event submitted so far has been applied.
    pub async fn sync(&self) -> Result<(), NodeError> {
        let target = self.submitted.load(Ordering::SeqCst);
        let mut applied = self.applied.clone();
        applied
            .wait_for(|n| *n >= target)
            .await
            .map(|_| ())
            .map_err(|_| NodeError::WorkerStopped {
                worker: "block-connection",
            })
    }

    /// Manual prune through `height`, clamped out of the minimum window.
    pub async fn prune_to_height(&self, height: BlockHeight) -> Result<PruneOutcome, NodeError> {
        let stopped = || NodeError::WorkerStopped { worker: "prune" };
        let (reply, response) = oneshot::channel();
        self.prune_requests
            .send(PruneRequest { height, reply })
            .await
            .map_err(|_| stopped())?;
        Ok(response.await.map_err(|_| stopped())??)
    }

    /// Stop the workers, flush, and release the data directory.
    pub async fn shutdown(self) -> Result<(), NodeError> {
        info!("Initiating graceful shutdown...");
        self.shutdown.trigger();

        let mut first_error = None;
        for (worker, handle) in self.workers {
            if let Err(e) = handle.await {
                error!(worker, error = %e, "worker did not stop cleanly");
                first_error.get_or_insert(NodeError::WorkerPanicked { worker });
            }
        }

        self.services.flush()?;
        let tip = *self.tip.borrow();
        info!(
            boundary = self.services.boundary.current(),
            tip = ?tip,
            "Shutdown complete"
        );
        first_error.map_or(Ok(()), Err)
    }
}

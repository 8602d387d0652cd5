//! # Prune Worker
//!
//! Sole deleter of block files and sole writer of the retention boundary.
//! Runs an automatic cycle every `prune_interval` against the current tip,
//! and serves manual `prune_to_height` requests in between. Each cycle holds
//! the chain lock for its whole duration.

use std::sync::Arc;
use std::time::Duration;

use block_storage::{PruneError, PruneOutcome, PruneTracker};
use node_telemetry::{
    PRUNE_BYTES_RECLAIMED, PRUNE_DELETION_FAILURES, PRUNE_FILES_DELETED, RETENTION_BOUNDARY,
};
use shared_types::BlockHeight;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::shutdown::ShutdownListener;

/// Manual prune request.
#[derive(Debug)]
pub struct PruneRequest {
    pub height: BlockHeight,
    pub reply: oneshot::Sender<Result<PruneOutcome, PruneError>>,
}

pub struct PruneHandler {
    tracker: Arc<PruneTracker>,
    chain_lock: Arc<Mutex<()>>,
    tip: watch::Receiver<Option<BlockHeight>>,
    requests: mpsc::Receiver<PruneRequest>,
    interval: Duration,
    shutdown: ShutdownListener,
}

impl PruneHandler {
    pub fn new(
        tracker: Arc<PruneTracker>,
        chain_lock: Arc<Mutex<()>>,
        tip: watch::Receiver<Option<BlockHeight>>,
        requests: mpsc::Receiver<PruneRequest>,
        interval: Duration,
        shutdown: ShutdownListener,
    ) -> Self {
        Self {
            tracker,
            chain_lock,
            tip,
            requests,
            interval,
            shutdown,
        }
    }

    /// Run until shutdown. An interrupted cycle is never started; one that
    /// already began finishes its current file first.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.interval.as_secs(),
            enabled = self.tracker.config().enabled,
            "[prune] prune worker started"
        );
        RETENTION_BOUNDARY.set(self.tracker.boundary().current() as f64);

        // First cycle one interval after start.
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.wait() => break,
                Some(request) = self.requests.recv() => {
                    let result = self.manual(request.height).await;
                    // The requester may have given up.
                    let _ = request.reply.send(result);
                }
                _ = ticker.tick() => self.automatic().await,
            }
        }
        info!("[prune] prune worker stopped");
    }

    async fn automatic(&self) {
        // Tip only after the lock; a reorg may have lowered it meanwhile.
        let _chain = self.chain_lock.lock().await;
        let Some(tip) = *self.tip.borrow() else {
            return;
        };

        match self.tracker.prune_cycle(tip) {
            Ok(outcome) => record(&outcome, tip),
            Err(e) => error!(tip, error = %e, "[prune] prune cycle failed"),
        }
    }

    async fn manual(&self, height: BlockHeight) -> Result<PruneOutcome, PruneError> {
        let _chain = self.chain_lock.lock().await;
        let tip = *self.tip.borrow();
        let outcome = match tip {
            Some(tip) => self.tracker.prune_to_height(height, tip)?,
            None if !self.tracker.config().enabled => return Err(PruneError::PruningDisabled),
            None => PruneOutcome::unchanged(self.tracker.boundary().current()),
        };
        record(&outcome, tip.unwrap_or_default());
        Ok(outcome)
    }
}

fn record(outcome: &PruneOutcome, tip: BlockHeight) {
    PRUNE_FILES_DELETED.inc_by(outcome.files_deleted.len() as f64);
    PRUNE_BYTES_RECLAIMED.inc_by(outcome.bytes_reclaimed as f64);
    PRUNE_DELETION_FAILURES.inc_by(outcome.failures.len() as f64);
    RETENTION_BOUNDARY.set(outcome.boundary_after as f64);

    for failure in &outcome.failures {
        warn!(
            file = %failure.file_id,
            error = %failure.error,
            "[prune] block file kept, retrying next cycle"
        );
    }

    if outcome.is_noop() {
        debug!(tip, boundary = outcome.boundary_after, "[prune] nothing to prune");
    } else {
        info!(
            tip,
            files_deleted = outcome.files_deleted.len(),
            bytes_reclaimed = outcome.bytes_reclaimed,
            boundary_before = outcome.boundary_before,
            boundary_after = outcome.boundary_after,
            failures = outcome.failures.len(),
            "[prune] prune completed"
        );
    }
}

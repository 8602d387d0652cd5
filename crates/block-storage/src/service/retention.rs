//! # Retention Boundary
//!
//! Lowest block height whose data is still guaranteed to be on disk.
//!
//! The value is written to the metadata store first and published to
//! readers second, so a reader can never observe a boundary that a restart
//! would roll back.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use shared_types::BlockHeight;
use tracing::{debug, info};

use crate::adapters::memory::InMemoryKVStore;
use crate::domain::errors::PruneError;
use crate::ports::outbound::KeyValueStore;

/// Metadata key holding the boundary as u64 LE.
pub const BOUNDARY_KEY: &[u8] = b"m:retention_boundary";

/// Durable, monotone retention boundary.
pub struct RetentionBoundary {
    current: AtomicU64,
    store: Mutex<Box<dyn KeyValueStore>>,
}

impl RetentionBoundary {
    /// Load the persisted boundary. A store without one starts at 0.
    pub fn load(store: Box<dyn KeyValueStore>) -> Result<Self, PruneError> {
        let height = match store.get(BOUNDARY_KEY).map_err(PruneError::BoundaryPersist)? {
            Some(bytes) => decode(&bytes)?,
            None => 0,
        };
        info!(boundary = height, "loaded retention boundary");
        Ok(Self {
            current: AtomicU64::new(height),
            store: Mutex::new(store),
        })
    }

    /// Boundary backed by a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self {
            current: AtomicU64::new(0),
            store: Mutex::new(Box::new(InMemoryKVStore::new())),
        }
    }

    pub fn current(&self) -> BlockHeight {
        self.current.load(Ordering::Acquire)
    }

    /// Whether data at `height` is guaranteed to still exist.
    pub fn is_retained(&self, height: BlockHeight) -> bool {
        height >= self.current()
    }

    /// Move the boundary forward to `height`.
    ///
    /// Returns `false` without writing if `height` is not above the current
    /// value. On a persistence failure the published value is unchanged.
    pub fn advance_to(&self, height: BlockHeight) -> Result<bool, PruneError> {
        let mut store = self.store.lock();
        let current = self.current.load(Ordering::Acquire);
        if height <= current {
            return Ok(false);
        }

        store
            .put(BOUNDARY_KEY, &height.to_le_bytes())
            .map_err(PruneError::BoundaryPersist)?;
        self.current.store(height, Ordering::Release);

        debug!(from = current, to = height, "advanced retention boundary");
        Ok(true)
    }

    /// Put the boundary back to 0 for a re-index from genesis.
    pub fn reset(&self) -> Result<(), PruneError> {
        let mut store = self.store.lock();
        store
            .put(BOUNDARY_KEY, &0u64.to_le_bytes())
            .map_err(PruneError::BoundaryPersist)?;
        self.current.store(0, Ordering::Release);
        info!("reset retention boundary");
        Ok(())
    }

    /// Flush the metadata store.
    pub fn flush(&self) -> Result<(), PruneError> {
        self.store.lock().flush().map_err(PruneError::BoundaryPersist)
    }
}

impl std::fmt::Debug for RetentionBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionBoundary")
            .field("current", &self.current())
            .finish()
    }
}

fn decode(bytes: &[u8]) -> Result<BlockHeight, PruneError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| PruneError::BoundaryCorrupt { len: bytes.len() })?;
    Ok(u64::from_le_bytes(raw))
}

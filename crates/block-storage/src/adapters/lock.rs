//! # Data Directory Lock
//!
//! Keeps a second node process away from the same block files and index.
//! Two writers on one directory would interleave appends and race the pruner.
//!
//! Uses `fs2` advisory locks (flock on Unix, LockFile on Windows).

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

/// Errors from acquiring the data directory lock
#[derive(Debug, Error)]
pub enum LockError {
    /// Lock file or its directory could not be created
    #[error("failed to create lock file {}: {source}", .path.display())]
    CreateFailed { path: PathBuf, source: io::Error },

    /// Another process holds the lock
    #[error("data directory already in use by process {pid:?} ({})", .path.display())]
    AlreadyLocked { pid: Option<u32>, path: PathBuf },

    /// Failed to record our PID
    #[error("failed to write PID to lock file: {0}")]
    WriteFailed(io::Error),
}

/// Exclusive lock on a data directory.
///
/// Held for the life of the node and released on drop.
///
/// ```ignore
/// let _lock = DatabaseLock::acquire(&config.data_dir)?;
/// ```
#[derive(Debug)]
pub struct DatabaseLock {
    file: File,
    path: PathBuf,
    pid: u32,
}

impl DatabaseLock {
    const LOCK_FILE: &'static str = "LOCK";

    /// Acquire the lock, creating `data_dir` if needed.
    ///
    /// # Errors
    ///
    /// `LockError::AlreadyLocked` if another process holds it.
    pub fn acquire(data_dir: &Path) -> Result<Self, LockError> {
        let path = data_dir.join(Self::LOCK_FILE);
        std::fs::create_dir_all(data_dir).map_err(|source| LockError::CreateFailed {
            path: path.clone(),
            source,
        })?;

        // Not truncated before locking: the holder's PID must stay readable.
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| LockError::CreateFailed {
                path: path.clone(),
                source,
            })?;

        if file.try_lock_exclusive().is_err() {
            let pid = Self::read_pid(&mut file);
            return Err(LockError::AlreadyLocked { pid, path });
        }

        let pid = std::process::id();
        file.set_len(0).map_err(LockError::WriteFailed)?;
        file.seek(SeekFrom::Start(0)).map_err(LockError::WriteFailed)?;
        writeln!(file, "{}", pid).map_err(LockError::WriteFailed)?;
        file.sync_all().map_err(LockError::WriteFailed)?;

        tracing::debug!(path = %path.display(), pid, "acquired data directory lock");
        Ok(Self { file, path, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_pid(file: &mut File) -> Option<u32> {
        let mut content = String::new();
        file.read_to_string(&mut content).ok()?;
        content.trim().parse().ok()
    }
}

impl Drop for DatabaseLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        let _ = std::fs::remove_file(&self.path);
    }
}

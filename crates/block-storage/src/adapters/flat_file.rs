//! # Flat-File Block Store
//!
//! Block records appended to numbered files (`blk00000.dat`, `blk00001.dat`,
//! ...) in one directory. A file is closed for appends once the next record
//! would push it past the preferred size.
//!
//! The file table sits behind a `RwLock` that is never held across file I/O
//! on the read path. A reader that loses the race with a deletion sees the
//! open fail and reports `FileMissing`.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use shared_types::{BlockHeight, FileId, TransactionLocation};
use tracing::{debug, info, warn};

use crate::domain::block_file::{
    encode_block_record, record_len, scan_block_file, should_roll, BlockFileInfo,
};
use crate::domain::errors::BlockStoreError;
use crate::ports::outbound::{BlockStore, BlockWriter};

const FILE_PREFIX: &str = "blk";
const FILE_SUFFIX: &str = ".dat";

#[derive(Debug, Default)]
struct FileTable {
    files: BTreeMap<FileId, BlockFileInfo>,
    current: Option<FileId>,
    next_id: FileId,
}

/// Block files on the local filesystem.
pub struct FlatFileBlockStore {
    dir: PathBuf,
    preferred_file_size: u64,
    table: RwLock<FileTable>,
    append_lock: Mutex<()>,
}

impl FlatFileBlockStore {
    /// Open (or create) the block directory and rebuild the file table.
    ///
    /// A torn record at the end of a file, left by a crash mid-append, is
    /// cut off. Files without a single complete record are removed.
    pub fn open(dir: impl AsRef<Path>, preferred_file_size: u64) -> Result<Self, BlockStoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(BlockStoreError::io)?;

        let mut table = FileTable::default();
        for entry in fs::read_dir(&dir).map_err(BlockStoreError::io)? {
            let entry = entry.map_err(BlockStoreError::io)?;
            let Some(file_id) = parse_file_name(&entry.file_name().to_string_lossy()) else {
                continue;
            };
            table.next_id = table.next_id.max(file_id.next());

            let path = entry.path();
            match Self::recover_file(file_id, &path)? {
                Some(info) => {
                    table.files.insert(file_id, info);
                }
                None => {
                    warn!(file = %file_id, "removing block file with no complete record");
                    fs::remove_file(&path).map_err(BlockStoreError::io)?;
                }
            }
        }
        table.current = table.files.keys().next_back().copied();

        info!(
            dir = %dir.display(),
            files = table.files.len(),
            "opened block files"
        );

        Ok(Self {
            dir,
            preferred_file_size,
            table: RwLock::new(table),
            append_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, file_id: FileId) -> PathBuf {
        file_path(&self.dir, file_id)
    }

    fn recover_file(file_id: FileId, path: &Path) -> Result<Option<BlockFileInfo>, BlockStoreError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(BlockStoreError::io)?;
        let len = file.metadata().map_err(BlockStoreError::io)?.len();

        let scanned = scan_block_file(file_id, &mut file, len)?;
        if scanned.valid_len < len {
            warn!(
                file = %file_id,
                file_len = len,
                valid_len = scanned.valid_len,
                "truncating torn block record"
            );
            file.set_len(scanned.valid_len).map_err(BlockStoreError::io)?;
            file.sync_all().map_err(BlockStoreError::io)?;
        }
        Ok(scanned.info)
    }
}

impl BlockStore for FlatFileBlockStore {
    fn read_range(&self, location: &TransactionLocation) -> Result<Vec<u8>, BlockStoreError> {
        let file_id = location.file_id;
        if !self.table.read().files.contains_key(&file_id) {
            return Err(BlockStoreError::FileMissing { file_id });
        }

        let mut file = match File::open(self.path_for(file_id)) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BlockStoreError::FileMissing { file_id })
            }
            Err(e) => return Err(BlockStoreError::io(e)),
        };

        let file_len = file.metadata().map_err(BlockStoreError::io)?.len();
        let unreadable = BlockStoreError::RegionUnreadable {
            file_id,
            offset: location.offset,
            end: location.end(),
            file_len,
        };
        if location.end() > file_len {
            return Err(unreadable);
        }

        file.seek(SeekFrom::Start(location.offset))
            .map_err(BlockStoreError::io)?;
        let mut buf = vec![0u8; location.length as usize];
        match file.read_exact(&mut buf) {
            Ok(()) => Ok(buf),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(unreadable),
            Err(e) => Err(BlockStoreError::io(e)),
        }
    }

    fn delete_file(&self, file_id: FileId) -> Result<u64, BlockStoreError> {
        let mut table = self.table.write();
        if table.current == Some(file_id) {
            return Err(BlockStoreError::FileInUse { file_id });
        }
        let Some(info) = table.files.remove(&file_id) else {
            return Ok(0);
        };

        let path = self.path_for(file_id);
        let bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(info.size_bytes);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(file = %file_id, bytes, "deleted block file");
                Ok(bytes)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => {
                table.files.insert(file_id, info);
                Err(BlockStoreError::io(e))
            }
        }
    }

    fn block_files(&self) -> Result<Vec<BlockFileInfo>, BlockStoreError> {
        Ok(self.table.read().files.values().copied().collect())
    }
}

impl BlockWriter for FlatFileBlockStore {
    fn append_block(
        &self,
        height: BlockHeight,
        transactions: &[Vec<u8>],
    ) -> Result<Vec<TransactionLocation>, BlockStoreError> {
        let _append = self.append_lock.lock();
        let len = record_len(transactions);

        let file_id = {
            let mut table = self.table.write();
            let current = table
                .current
                .and_then(|id| table.files.get(&id).map(|info| (id, info.size_bytes)));
            match current {
                Some((id, size)) if !should_roll(size, len, self.preferred_file_size) => id,
                _ => {
                    let id = table.next_id;
                    table.next_id = id.next();
                    table.current = Some(id);
                    id
                }
            }
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(file_id))
            .map_err(BlockStoreError::io)?;
        let base_offset = file.metadata().map_err(BlockStoreError::io)?.len();

        let encoded = encode_block_record(file_id, base_offset, height, transactions)?;
        file.write_all(&encoded.bytes).map_err(BlockStoreError::io)?;
        file.sync_data().map_err(BlockStoreError::io)?;

        let mut table = self.table.write();
        match table.files.get_mut(&file_id) {
            Some(info) => info.add_block(height, len),
            None => {
                table
                    .files
                    .insert(file_id, BlockFileInfo::new(file_id, height, len));
            }
        }
        Ok(encoded.locations)
    }
}

fn file_path(dir: &Path, file_id: FileId) -> PathBuf {
    dir.join(format!("{}{}", file_id, FILE_SUFFIX))
}

fn parse_file_name(name: &str) -> Option<FileId> {
    let digits = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(FileId)
}

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use casket_block::{BlockError, BlockResult};
use casket_types::BlockId;

use crate::entry::{IndexEntry, IndexStats};
use crate::index::{BlockIndex, MemoryIndex};

/// Record header: 4 bytes length + 4 bytes CRC32, both little-endian.
const HEADER_SIZE: usize = 8;

/// One journaled index mutation.
#[derive(Debug, Serialize, Deserialize)]
enum WalRecord {
    Set(IndexEntry),
    Remove(BlockId),
}

/// Persistent block index backed by an append-only journal.
///
/// Each mutation is bincode-serialized and framed with a length prefix and
/// a CRC32 checksum. On open the journal is replayed front-to-back into an
/// in-memory map; a torn or corrupt trailing record ends replay without
/// error, since it represents an incomplete write from a crash.
pub struct WalIndex {
    path: PathBuf,
    mem: MemoryIndex,
    writer: Mutex<BufWriter<File>>,
}

impl WalIndex {
    /// Open (or create) the journal at `path` and replay it.
    pub fn open(path: &Path) -> BlockResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mem = MemoryIndex::new();
        let replayed = Self::replay(path, &mem)?;
        debug!(path = %path.display(), entries = replayed, "block index journal replayed");

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            mem,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn replay(path: &Path, mem: &MemoryIndex) -> BlockResult<usize> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        let mut applied = 0;
        let mut at = 0;
        while data.len() - at >= HEADER_SIZE {
            let len = u32::from_le_bytes(data[at..at + 4].try_into().expect("4 bytes")) as usize;
            let crc = u32::from_le_bytes(data[at + 4..at + 8].try_into().expect("4 bytes"));
            let start = at + HEADER_SIZE;
            if data.len() - start < len {
                warn!(offset = at, "journal ends in a torn record, ignoring tail");
                break;
            }
            let payload = &data[start..start + len];
            if crc32fast::hash(payload) != crc {
                warn!(offset = at, "journal record failed CRC check, ignoring tail");
                break;
            }
            let record: WalRecord = match bincode::deserialize(payload) {
                Ok(record) => record,
                Err(err) => {
                    warn!(offset = at, error = %err, "undecodable journal record, ignoring tail");
                    break;
                }
            };
            match record {
                WalRecord::Set(entry) => {
                    // Later records win; an exists error here means a
                    // duplicate append, which replay tolerates.
                    let _ = mem.set(entry);
                }
                WalRecord::Remove(id) => {
                    let _ = mem.remove(&id);
                }
            }
            applied += 1;
            at = start + len;
        }
        Ok(applied)
    }

    fn append(&self, record: &WalRecord) -> BlockResult<()> {
        let payload = bincode::serialize(record).map_err(|_| BlockError::InvalidBlock)?;
        let mut writer = self.writer.lock().expect("lock poisoned");
        writer.write_all(&(payload.len() as u32).to_le_bytes())?;
        writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
        writer.write_all(&payload)?;
        writer.flush()?;
        Ok(())
    }
}

impl BlockIndex for WalIndex {
    fn get(&self, id: &BlockId) -> BlockResult<IndexEntry> {
        self.mem.get(id)
    }

    fn set(&self, entry: IndexEntry) -> BlockResult<()> {
        self.mem.set(entry.clone())?;
        self.append(&WalRecord::Set(entry))
    }

    fn remove(&self, id: &BlockId) -> BlockResult<IndexEntry> {
        let entry = self.mem.remove(id)?;
        self.append(&WalRecord::Remove(*id))?;
        Ok(entry)
    }

    fn exists(&self, id: &BlockId) -> bool {
        self.mem.exists(id)
    }

    fn iter(&self, f: &mut dyn FnMut(&IndexEntry) -> BlockResult<()>) -> BlockResult<()> {
        self.mem.iter(f)
    }

    fn stats(&self) -> IndexStats {
        self.mem.stats()
    }
}

use std::sync::Arc;

use tracing::{debug, info, warn};

use casket_block::{Block, BlockError, BlockResult, DataBlock, IndexBlock, MetaBlock, TreeBlock};
use casket_types::{BlockId, BlockType, HashKind};

use crate::entry::IndexEntry;
use crate::index::BlockIndex;
use crate::raw::FileRawDevice;

/// Data blocks smaller than this live inline in the index; larger bodies
/// go to the raw backend (4 KiB).
pub const INLINE_THRESHOLD: u64 = 4096;

/// Observer notified after successful device mutations.
///
/// The delegate is installed before the device is shared and never changed
/// concurrently.
pub trait DeviceDelegate: Send + Sync {
    fn block_set(&self, entry: &IndexEntry);
    fn block_remove(&self, id: &BlockId);
}

/// Full device statistics: index counters plus the raw backend file count.
#[derive(Clone, Copy, Debug, serde::Serialize)]
pub struct DeviceStats {
    pub data_blocks: usize,
    pub index_blocks: usize,
    pub tree_blocks: usize,
    pub meta_blocks: usize,
    pub total_blocks: usize,
    pub on_disk_blocks: usize,
    pub used_bytes: u64,
}

/// Two-level block store: a metadata index over a raw block backend.
///
/// Index, Tree, and Meta blocks are stored entirely in the index as their
/// canonical bodies. Data blocks are routed by size: below
/// [`INLINE_THRESHOLD`] the body is inlined in the index entry, at or
/// above it the body is persisted by the raw backend and only type and
/// size are indexed.
pub struct BlockDevice {
    index: Arc<dyn BlockIndex>,
    raw: FileRawDevice,
    hash: HashKind,
    delegate: Option<Arc<dyn DeviceDelegate>>,
}

impl BlockDevice {
    pub fn new(index: Arc<dyn BlockIndex>, raw: FileRawDevice) -> Self {
        let hash = raw.hasher();
        Self {
            index,
            raw,
            hash,
            delegate: None,
        }
    }

    /// Install the mutation observer. Must be called before the device is
    /// shared.
    pub fn set_delegate(&mut self, delegate: Arc<dyn DeviceDelegate>) {
        self.delegate = Some(delegate);
    }

    /// Hash function used for id generation.
    pub fn hasher(&self) -> HashKind {
        self.hash
    }

    pub fn raw(&self) -> &FileRawDevice {
        &self.raw
    }

    /// Persist a block and return its canonical id.
    ///
    /// A duplicate returns [`BlockError::BlockExists`] with the index
    /// entry intact; callers that treat duplicates as success proceed with
    /// the block's own id.
    pub fn set_block(&self, blk: &Block) -> BlockResult<BlockId> {
        let claimed = blk.id().ok_or(BlockError::InvalidBlock)?;
        debug!(id = %claimed.short_hex(), kind = %blk.block_type(), size = blk.size(), "set block");

        match blk.block_type() {
            BlockType::Data => {
                if blk.size() < INLINE_THRESHOLD {
                    self.set_inline(BlockType::Data, blk)
                } else {
                    self.set_external(blk)
                }
            }
            kind @ (BlockType::Index | BlockType::Tree | BlockType::Meta) => {
                self.set_inline(kind, blk)
            }
        }
    }

    /// Store a body entirely in the index, recomputing the canonical id
    /// from the bytes read.
    fn set_inline(&self, kind: BlockType, blk: &Block) -> BlockResult<BlockId> {
        let body = blk.read_body()?;
        let id = self.hash.block_id(kind, &body);
        let entry = IndexEntry::inline(id, kind, body);
        self.index.set(entry.clone())?;
        self.notify_set(&entry);
        Ok(id)
    }

    fn set_external(&self, blk: &Block) -> BlockResult<BlockId> {
        let size = blk.size();
        match self.raw.set(blk) {
            Ok(id) => {
                let entry = IndexEntry::external(id, size);
                match self.index.set(entry.clone()) {
                    // A dangling index entry from a prior run is refreshed
                    // by reindex, not here.
                    Ok(()) | Err(BlockError::BlockExists) => {}
                    Err(err) => return Err(err),
                }
                self.notify_set(&entry);
                Ok(id)
            }
            Err(BlockError::BlockExists) => {
                // The body is already on disk; make sure it is indexed,
                // then report the duplicate.
                let id = blk.id().expect("checked above");
                let _ = self.index.set(IndexEntry::external(id, size));
                Err(BlockError::BlockExists)
            }
            Err(err) => Err(err),
        }
    }

    /// Fetch a block by id. Inline bodies are reconstructed from the index
    /// entry; external Data blocks come from the raw backend.
    pub fn get_block(&self, id: &BlockId) -> BlockResult<Block> {
        let entry = self.index.get(id)?;
        match entry.block_type {
            BlockType::Data => match entry.data {
                Some(data) => Ok(DataBlock::from_bytes(self.hash, data).into()),
                None => Ok(self.raw.get(id)?.into()),
            },
            BlockType::Index => {
                let data = entry.data.ok_or(BlockError::InvalidBlock)?;
                Ok(IndexBlock::decode_body(self.hash, &data)?.into())
            }
            BlockType::Tree => {
                let data = entry.data.ok_or(BlockError::InvalidBlock)?;
                Ok(TreeBlock::decode_body(self.hash, &data)?.into())
            }
            BlockType::Meta => {
                let data = entry.data.ok_or(BlockError::InvalidBlock)?;
                Ok(MetaBlock::decode_body(self.hash, &data)?.into())
            }
        }
    }

    /// Whether the id is present in the index.
    pub fn block_exists(&self, id: &BlockId) -> bool {
        self.index.exists(id)
    }

    /// Remove a block. Fully-inline blocks clear only their index entry;
    /// external Data blocks are also unlinked from the raw backend.
    /// Children referenced by Index/Tree/Meta blocks are not touched.
    pub fn remove_block(&self, id: &BlockId) -> BlockResult<()> {
        match self.index.remove(id) {
            Ok(entry) => {
                if !entry.is_inline() {
                    self.raw.remove(id)?;
                }
            }
            // Not indexed; the file may still exist from an earlier run.
            Err(BlockError::BlockNotFound) => self.raw.remove(id)?,
            Err(err) => return Err(err),
        }
        debug!(id = %id.short_hex(), "block removed");
        if let Some(delegate) = &self.delegate {
            delegate.block_remove(id);
        }
        Ok(())
    }

    /// Walk the raw backend and index any block files missing from the
    /// index. Per-block failures are logged and skipped. Returns the
    /// number of entries added.
    pub fn reindex(&self) -> BlockResult<usize> {
        let mut added = 0;
        self.raw.iter_ids(|id| {
            if self.index.exists(&id) {
                return Ok(());
            }
            match self.raw.get(&id) {
                Ok(blk) => {
                    let entry = IndexEntry::external(id, blk.size());
                    match self.index.set(entry) {
                        Ok(()) => added += 1,
                        Err(err) => {
                            warn!(id = %id.short_hex(), %err, "reindex: index insert failed")
                        }
                    }
                }
                Err(err) => warn!(id = %id.short_hex(), %err, "reindex: unreadable block file"),
            }
            Ok(())
        })?;
        if added > 0 {
            info!(added, "reindex complete");
        }
        Ok(added)
    }

    pub fn stats(&self) -> BlockResult<DeviceStats> {
        let index = self.index.stats();
        Ok(DeviceStats {
            data_blocks: index.data_blocks,
            index_blocks: index.index_blocks,
            tree_blocks: index.tree_blocks,
            meta_blocks: index.meta_blocks,
            total_blocks: index.total_blocks,
            on_disk_blocks: self.raw.count()?,
            used_bytes: index.used_bytes,
        })
    }

    fn notify_set(&self, entry: &IndexEntry) {
        if let Some(delegate) = &self.delegate {
            delegate.block_set(entry);
        }
    }
}

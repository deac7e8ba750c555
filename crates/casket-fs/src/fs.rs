use std::sync::Arc;

use tracing::debug;

use casket_block::{Block, BlockError, TreeBlock, TreeNode};
use casket_device::BlockDevice;
use casket_types::{BlockId, BlockType, HashKind, DEFAULT_BLOCK_SIZE};

use crate::error::FsResult;
use crate::file::{DirHandle, FileReader, FileStat, FileWriter, FsNode};

/// File-system style interface over a block device.
///
/// Files are IndexBlock-rooted streams written through [`FileWriter`] and
/// read through [`FileReader`]; directories are TreeBlocks. All access is
/// by content id.
pub struct Fs {
    dev: Arc<BlockDevice>,
}

impl Fs {
    pub fn new(dev: Arc<BlockDevice>) -> Self {
        Self { dev }
    }

    pub fn name(&self) -> &'static str {
        "casket"
    }

    pub fn hasher(&self) -> HashKind {
        self.dev.hasher()
    }

    pub fn device(&self) -> &Arc<BlockDevice> {
        &self.dev
    }

    /// Create a new file with the default block size. The file's id is
    /// known only after [`FileWriter::finish`].
    pub fn create(&self) -> FileWriter {
        self.create_with_block_size(DEFAULT_BLOCK_SIZE)
    }

    /// Create a new file cut into `block_size` shards.
    pub fn create_with_block_size(&self, block_size: u64) -> FileWriter {
        FileWriter::spawn(Arc::clone(&self.dev), block_size)
    }

    /// Open an id for reading. Index and Data roots resolve to files,
    /// Tree roots to directories; Meta blocks are not filesystem nodes.
    pub fn open(&self, id: &BlockId) -> FsResult<FsNode> {
        match self.dev.get_block(id)? {
            Block::Index(idx) => Ok(FsNode::File(FileReader::from_index(
                Arc::clone(&self.dev),
                *id,
                idx,
            ))),
            Block::Data(data) => Ok(FsNode::File(FileReader::from_data(*id, &data))),
            Block::FileData(file) => {
                // Pull the body through the device-level reader once.
                let body = Block::FileData(file).read_body()?;
                let data = casket_block::DataBlock::from_bytes(self.dev.hasher(), body);
                Ok(FsNode::File(FileReader::from_data(*id, &data)))
            }
            Block::Tree(tree) => Ok(FsNode::Dir(DirHandle::new(*id, tree))),
            Block::Meta(_) | Block::Streamed(_) => Err(BlockError::InvalidBlockType.into()),
        }
    }

    /// Build and store a directory from entries. Later duplicates of a
    /// name win, matching tree semantics.
    pub fn create_dir<I>(&self, nodes: I) -> FsResult<BlockId>
    where
        I: IntoIterator<Item = TreeNode>,
    {
        let mut tree = TreeBlock::new(self.dev.hasher());
        tree.add_nodes(nodes);
        let id = tree.id();
        match self.dev.set_block(&tree.into()) {
            Ok(id) => Ok(id),
            Err(BlockError::BlockExists) => Ok(id),
            Err(err) => Err(err.into()),
        }
    }

    /// Stat an id without materializing file contents.
    pub fn stat(&self, id: &BlockId) -> FsResult<FileStat> {
        let blk = self.dev.get_block(id)?;
        let (size, is_dir) = match &blk {
            Block::Index(idx) => (idx.file_size(), false),
            Block::Tree(_) => (blk.size(), true),
            _ => (blk.size(), false),
        };
        Ok(FileStat {
            id: *id,
            block_type: blk.block_type(),
            size,
            is_dir,
        })
    }

    /// Remove a block by id. Children of an index or tree root are left
    /// in place; higher layers decide when those are dead.
    pub fn remove(&self, id: &BlockId) -> FsResult<()> {
        debug!(id = %id.short_hex(), "fs remove");
        Ok(self.dev.remove_block(id)?)
    }
}

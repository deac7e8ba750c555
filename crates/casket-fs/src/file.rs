use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver};
use tracing::debug;

use casket_block::{Block, BlockError, DataBlock, IndexBlock, TreeBlock, TreeNode};
use casket_device::BlockDevice;
use casket_types::{BlockId, BlockType};

use crate::error::{FsError, FsResult};
use crate::shard_writer::ShardWriter;

/// How many fetched-but-unread chunks a reader keeps in flight.
const READAHEAD: usize = 8;

/// Metadata about a stored file or directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub id: BlockId,
    pub block_type: BlockType,
    /// Stream size for files, body size for directories.
    pub size: u64,
    pub is_dir: bool,
}

impl FileStat {
    /// Display name: the hex id (tree entries carry the human name).
    pub fn name(&self) -> String {
        self.id.to_hex()
    }
}

/// Streaming writer for a new file.
///
/// Bytes are cut into block-size shards; a background worker persists each
/// shard as a Data block and accumulates the IndexBlock. `finish` seals
/// the index, stores it, and returns the file's stat.
pub struct FileWriter {
    shards: Option<ShardWriter>,
    worker: Option<JoinHandle<FsResult<IndexBlock>>>,
    dev: Arc<BlockDevice>,
}

impl FileWriter {
    pub(crate) fn spawn(dev: Arc<BlockDevice>, block_size: u64) -> Self {
        let (shards, rx) = ShardWriter::new(block_size, READAHEAD);
        let worker_dev = Arc::clone(&dev);
        let worker = thread::spawn(move || persist_shards(worker_dev, block_size, rx));
        Self {
            shards: Some(shards),
            worker: Some(worker),
            dev,
        }
    }

    /// Seal the file: flush the final shard, wait for the persister, and
    /// store the IndexBlock.
    pub fn finish(mut self) -> FsResult<FileStat> {
        self.shards
            .take()
            .expect("finish called once")
            .close()?;
        let idx = self
            .worker
            .take()
            .expect("finish called once")
            .join()
            .map_err(|_| FsError::WriteAborted("block persister panicked".into()))??;

        let size = idx.file_size();
        let sealed = idx.id();
        let id = match self.dev.set_block(&Block::Index(idx)) {
            Ok(id) => id,
            // Identical file content already stored; reuse its index.
            Err(BlockError::BlockExists) => sealed,
            Err(err) => return Err(err.into()),
        };
        debug!(id = %id.short_hex(), size, "file sealed");

        Ok(FileStat {
            id,
            block_type: BlockType::Index,
            size,
            is_dir: false,
        })
    }
}

impl Write for FileWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.shards
            .as_mut()
            .expect("writer not finished")
            .write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn persist_shards(
    dev: Arc<BlockDevice>,
    block_size: u64,
    rx: Receiver<crate::shard_writer::Shard>,
) -> FsResult<IndexBlock> {
    let mut idx = IndexBlock::new(dev.hasher());
    idx.set_block_size(block_size);

    for shard in rx {
        let size = shard.data.len() as u64;
        let blk: Block = DataBlock::from_bytes(dev.hasher(), shard.data).into();
        let id = match dev.set_block(&blk) {
            Ok(id) => id,
            Err(BlockError::BlockExists) => blk.id().expect("data blocks carry ids"),
            Err(err) => return Err(err.into()),
        };
        idx.add_block(shard.index + 1, id, size);
    }
    Ok(idx)
}

/// Streaming reader over a stored file, strict stream order.
///
/// A single fetch task walks the index children in position order and
/// keeps a bounded readahead of chunk bodies.
#[derive(Debug)]
pub struct FileReader {
    stat: FileStat,
    chunks: Option<Receiver<FsResult<Vec<u8>>>>,
    current: Option<Cursor<Vec<u8>>>,
    _worker: Option<JoinHandle<()>>,
}

impl FileReader {
    /// Reader over an index-rooted file.
    pub(crate) fn from_index(dev: Arc<BlockDevice>, id: BlockId, idx: IndexBlock) -> Self {
        let stat = FileStat {
            id,
            block_type: BlockType::Index,
            size: idx.file_size(),
            is_dir: false,
        };
        let (tx, rx) = bounded(READAHEAD);
        let worker = thread::spawn(move || {
            for child in idx.children() {
                let chunk = dev
                    .get_block(&child)
                    .and_then(|blk| blk.read_body())
                    .map_err(FsError::from);
                let failed = chunk.is_err();
                if tx.send(chunk).is_err() || failed {
                    return;
                }
            }
        });
        Self {
            stat,
            chunks: Some(rx),
            current: None,
            _worker: Some(worker),
        }
    }

    /// Reader over a bare Data block root.
    pub(crate) fn from_data(id: BlockId, blk: &DataBlock) -> Self {
        Self {
            stat: FileStat {
                id,
                block_type: BlockType::Data,
                size: blk.size(),
                is_dir: false,
            },
            chunks: None,
            current: Some(Cursor::new(blk.body().to_vec())),
            _worker: None,
        }
    }

    pub fn stat(&self) -> &FileStat {
        &self.stat
    }

    pub fn size(&self) -> u64 {
        self.stat.size
    }
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if let Some(cursor) = self.current.as_mut() {
                let n = cursor.read(buf)?;
                if n > 0 {
                    return Ok(n);
                }
                self.current = None;
            }
            let Some(chunks) = self.chunks.as_ref() else {
                return Ok(0);
            };
            match chunks.recv() {
                Ok(Ok(data)) => self.current = Some(Cursor::new(data)),
                Ok(Err(err)) => {
                    self.chunks = None;
                    return Err(io::Error::other(err.to_string()));
                }
                Err(_) => {
                    self.chunks = None;
                    return Ok(0);
                }
            }
        }
    }
}

/// Handle on a stored directory (tree block).
#[derive(Debug)]
pub struct DirHandle {
    stat: FileStat,
    tree: TreeBlock,
}

impl DirHandle {
    pub(crate) fn new(id: BlockId, tree: TreeBlock) -> Self {
        Self {
            stat: FileStat {
                id,
                block_type: BlockType::Tree,
                size: tree.size(),
                is_dir: true,
            },
            tree,
        }
    }

    pub fn stat(&self) -> &FileStat {
        &self.stat
    }

    /// Entries in lexicographic name order.
    pub fn read_dir(&self) -> Vec<TreeNode> {
        let mut out = Vec::with_capacity(self.tree.node_count());
        self.tree
            .iter(|node| {
                out.push(node.clone());
                Ok(())
            })
            .expect("in-memory iteration is infallible");
        out
    }

    /// Entry names in lexicographic order.
    pub fn read_dir_names(&self) -> Vec<String> {
        self.read_dir().into_iter().map(|n| n.name).collect()
    }

    pub fn get(&self, name: &str) -> Option<TreeNode> {
        self.tree.get_by_name(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tree.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.node_count() == 0
    }
}

/// A resolved node: a readable file or a directory listing.
#[derive(Debug)]
pub enum FsNode {
    File(FileReader),
    Dir(DirHandle),
}

impl FsNode {
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Dir(_))
    }

    pub fn stat(&self) -> &FileStat {
        match self {
            Self::File(file) => file.stat(),
            Self::Dir(dir) => dir.stat(),
        }
    }

    /// Unwrap as a file reader, failing on directories.
    pub fn into_reader(self) -> FsResult<FileReader> {
        match self {
            Self::File(file) => Ok(file),
            Self::Dir(_) => Err(FsError::IsDirectory),
        }
    }

    /// Unwrap as a directory, failing on files.
    pub fn into_dir(self) -> FsResult<DirHandle> {
        match self {
            Self::Dir(dir) => Ok(dir),
            Self::File(_) => Err(FsError::NotDirectory),
        }
    }
}

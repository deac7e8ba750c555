use std::io::Write;

use casket_types::{BlockId, BlockType, BlockUri, HashKind};

use crate::error::BlockResult;
use crate::hashing::HashingWriter;

/// Memory-backed data block: opaque user bytes held in a buffer.
///
/// The id is `H(type ‖ body)` and is fixed at construction; the body is
/// immutable afterwards.
#[derive(Debug, Clone)]
pub struct DataBlock {
    id: BlockId,
    data: Vec<u8>,
    uri: Option<BlockUri>,
    hash: HashKind,
}

impl DataBlock {
    /// Build a block directly from a complete body.
    pub fn from_bytes(hash: HashKind, data: Vec<u8>) -> Self {
        let id = hash.block_id(BlockType::Data, &data);
        Self {
            id,
            data,
            uri: Some(BlockUri::memory()),
            hash,
        }
    }

    /// Open a writer that accumulates the body and finalizes the id on
    /// [`DataBlockWriter::finish`].
    pub fn writer(hash: HashKind) -> DataBlockWriter {
        let mut hw = HashingWriter::new(hash, Vec::new());
        // The type tag is hashed but not part of the stored body.
        hw.absorb(&[BlockType::Data.as_byte()]);
        DataBlockWriter { hw, hash }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn body(&self) -> &[u8] {
        &self.data
    }

    pub fn uri(&self) -> Option<&BlockUri> {
        self.uri.as_ref()
    }

    pub fn hash_kind(&self) -> HashKind {
        self.hash
    }

    /// Recompute the id from the body. Always equals [`DataBlock::id`] for
    /// a well-formed block.
    pub fn compute_hash(&self) -> BlockId {
        self.hash.block_id(BlockType::Data, &self.data)
    }
}

/// In-progress write of a memory-backed data block.
pub struct DataBlockWriter {
    hw: HashingWriter<Vec<u8>>,
    hash: HashKind,
}

impl DataBlockWriter {
    /// Seal the body and return the finished block with its id defined.
    pub fn finish(self) -> BlockResult<DataBlock> {
        let hash = self.hash;
        let (id, _, data) = self.hw.finalize();
        Ok(DataBlock {
            id,
            data,
            uri: Some(BlockUri::memory()),
            hash,
        })
    }
}

impl Write for DataBlockWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.hw.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.hw.flush()
    }
}

use std::collections::BTreeMap;

use casket_types::{BlockId, BlockType, BlockUri, HashKind, DEFAULT_BLOCK_SIZE};

use crate::error::{BlockError, BlockResult};

/// Ordered index of the data blocks making up one logical stream.
///
/// The body encodes the total stream size, the shard size, and the child
/// ids in stream order. Child positions are 1-based and dense; iteration
/// and the sharder's internal shard stream use 0-based indices.
#[derive(Debug, Clone)]
pub struct IndexBlock {
    file_size: u64,
    block_size: u64,
    /// Children keyed by 1-based position.
    children: BTreeMap<u64, BlockId>,
    uri: Option<BlockUri>,
    hash: HashKind,
}

impl IndexBlock {
    pub fn new(hash: HashKind) -> Self {
        Self {
            file_size: 0,
            block_size: DEFAULT_BLOCK_SIZE,
            children: BTreeMap::new(),
            uri: None,
            hash,
        }
    }

    /// Total size of the stream this index reconstitutes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn set_file_size(&mut self, size: u64) {
        self.file_size = size;
    }

    /// Shard size of the member data blocks.
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Set the shard size. Must be called before children are added for
    /// the count invariant to hold.
    pub fn set_block_size(&mut self, size: u64) {
        self.block_size = size;
    }

    /// Record a child at the given 1-based position, accumulating its size
    /// into the stream size. A repeated position overwrites.
    pub fn add_block(&mut self, position: u64, id: BlockId, size: u64) {
        debug_assert!(position >= 1, "index positions are 1-based");
        if self.children.insert(position, id).is_none() {
            self.file_size += size;
        }
    }

    /// Number of children present.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Child ids in stream order.
    pub fn children(&self) -> Vec<BlockId> {
        self.children.values().copied().collect()
    }

    /// Walk children in ascending position order. The callback receives
    /// the 0-based stream index; its first error short-circuits.
    pub fn iter<F>(&self, mut f: F) -> BlockResult<()>
    where
        F: FnMut(u64, &BlockId) -> BlockResult<()>,
    {
        for (position, id) in &self.children {
            f(position - 1, id)?;
        }
        Ok(())
    }

    pub fn uri(&self) -> Option<&BlockUri> {
        self.uri.as_ref()
    }

    pub fn hash_kind(&self) -> HashKind {
        self.hash
    }

    /// Body size in bytes: two u64 fields plus one digest per child.
    pub fn size(&self) -> u64 {
        16 + (self.children.len() * BlockId::LEN) as u64
    }

    /// Content id over the canonical encoding: `H(type ‖ body)`.
    pub fn id(&self) -> BlockId {
        self.hash.block_id(BlockType::Index, &self.encode_body())
    }

    /// Canonical body: `file_size(u64 BE) ‖ block_size(u64 BE) ‖ child ids
    /// in position order`. The type tag is not part of the body.
    pub fn encode_body(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size() as usize);
        out.extend_from_slice(&self.file_size.to_be_bytes());
        out.extend_from_slice(&self.block_size.to_be_bytes());
        for id in self.children.values() {
            out.extend_from_slice(id.as_bytes());
        }
        out
    }

    /// Decode a canonical body. The child count is derived from
    /// `ceil(file_size / block_size)` (zero when the stream is empty) and
    /// the id bytes must match it exactly.
    pub fn decode_body(hash: HashKind, body: &[u8]) -> BlockResult<Self> {
        if body.len() < 16 {
            return Err(BlockError::InvalidBlock);
        }
        let file_size = u64::from_be_bytes(body[0..8].try_into().expect("8 bytes"));
        let block_size = u64::from_be_bytes(body[8..16].try_into().expect("8 bytes"));
        if block_size == 0 {
            return Err(BlockError::InvalidBlock);
        }

        let count = if file_size == 0 {
            0
        } else {
            file_size.div_ceil(block_size)
        };

        let ids = &body[16..];
        if ids.len() as u64 != count * BlockId::LEN as u64 {
            return Err(BlockError::InvalidBlock);
        }

        let mut children = BTreeMap::new();
        for i in 0..count {
            let at = (i as usize) * BlockId::LEN;
            let id = BlockId::from_slice(&ids[at..at + BlockId::LEN])?;
            children.insert(i + 1, id);
        }

        Ok(Self {
            file_size,
            block_size,
            children,
            uri: None,
            hash,
        })
    }
}

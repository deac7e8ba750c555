use serde::{Deserialize, Serialize};

use casket_types::{BlockId, BlockType};

/// One record in the block index: the block's identity plus, for blocks
/// stored fully in the index, the canonical body bytes.
///
/// `data` is present for Index/Tree/Meta blocks and for Data blocks below
/// the inline threshold; larger Data blocks live on the raw backend and
/// keep only their type and size here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: BlockId,
    pub block_type: BlockType,
    pub size: u64,
    pub data: Option<Vec<u8>>,
}

impl IndexEntry {
    /// Entry holding the block body inline.
    pub fn inline(id: BlockId, block_type: BlockType, data: Vec<u8>) -> Self {
        Self {
            id,
            block_type,
            size: data.len() as u64,
            data: Some(data),
        }
    }

    /// Entry for a Data block stored on the raw backend.
    pub fn external(id: BlockId, size: u64) -> Self {
        Self {
            id,
            block_type: BlockType::Data,
            size,
            data: None,
        }
    }

    /// Whether the body lives entirely in the index.
    pub fn is_inline(&self) -> bool {
        self.data.is_some()
    }
}

/// Per-type counters over the index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub data_blocks: usize,
    pub index_blocks: usize,
    pub tree_blocks: usize,
    pub meta_blocks: usize,
    pub total_blocks: usize,
    /// Sum of `size` across all entries.
    pub used_bytes: u64,
}

impl IndexStats {
    pub(crate) fn record(&mut self, entry: &IndexEntry) {
        match entry.block_type {
            BlockType::Data => self.data_blocks += 1,
            BlockType::Index => self.index_blocks += 1,
            BlockType::Tree => self.tree_blocks += 1,
            BlockType::Meta => self.meta_blocks += 1,
        }
        self.total_blocks += 1;
        self.used_bytes += entry.size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(b: u8) -> BlockId {
        BlockId::from_digest([b; 32])
    }

    #[test]
    fn inline_entry_tracks_size() {
        let entry = IndexEntry::inline(id(1), BlockType::Tree, vec![0; 42]);
        assert!(entry.is_inline());
        assert_eq!(entry.size, 42);
    }

    #[test]
    fn external_entry_has_no_body() {
        let entry = IndexEntry::external(id(2), 1 << 20);
        assert!(!entry.is_inline());
        assert_eq!(entry.block_type, BlockType::Data);
        assert_eq!(entry.size, 1 << 20);
    }

    #[test]
    fn stats_accumulate_by_type() {
        let mut stats = IndexStats::default();
        stats.record(&IndexEntry::inline(id(1), BlockType::Data, vec![0; 10]));
        stats.record(&IndexEntry::inline(id(2), BlockType::Index, vec![0; 16]));
        stats.record(&IndexEntry::external(id(3), 5000));

        assert_eq!(stats.data_blocks, 2);
        assert_eq!(stats.index_blocks, 1);
        assert_eq!(stats.total_blocks, 3);
        assert_eq!(stats.used_bytes, 5026);
    }
}

use std::collections::HashMap;
use std::sync::RwLock;

use casket_block::{BlockError, BlockResult};
use casket_types::BlockId;

use crate::entry::{IndexEntry, IndexStats};

/// Map from block id to its index entry.
///
/// This is the primary store for small Data blocks and all Index/Tree/Meta
/// metadata. Implementations must be safe to share across connection
/// handler and worker threads.
pub trait BlockIndex: Send + Sync {
    /// Look up an entry. Missing ids return [`BlockError::BlockNotFound`].
    fn get(&self, id: &BlockId) -> BlockResult<IndexEntry>;

    /// Insert an entry. An already-present id returns
    /// [`BlockError::BlockExists`] and leaves the stored entry untouched.
    fn set(&self, entry: IndexEntry) -> BlockResult<()>;

    /// Remove and return an entry. Missing ids return
    /// [`BlockError::BlockNotFound`].
    fn remove(&self, id: &BlockId) -> BlockResult<IndexEntry>;

    fn exists(&self, id: &BlockId) -> bool;

    /// Walk all entries in unspecified order; the callback's first error
    /// short-circuits.
    fn iter(&self, f: &mut dyn FnMut(&IndexEntry) -> BlockResult<()>) -> BlockResult<()>;

    /// Counters by type plus the used-bytes total.
    fn stats(&self) -> IndexStats;
}

struct Shared {
    entries: HashMap<BlockId, IndexEntry>,
    used_bytes: u64,
}

/// In-memory block index guarded by a readers-writer lock.
pub struct MemoryIndex {
    shared: RwLock<Shared>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            shared: RwLock::new(Shared {
                entries: HashMap::new(),
                used_bytes: 0,
            }),
        }
    }

    /// Number of entries currently indexed.
    pub fn len(&self) -> usize {
        self.shared.read().expect("lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockIndex for MemoryIndex {
    fn get(&self, id: &BlockId) -> BlockResult<IndexEntry> {
        let shared = self.shared.read().expect("lock poisoned");
        shared.entries.get(id).cloned().ok_or(BlockError::BlockNotFound)
    }

    fn set(&self, entry: IndexEntry) -> BlockResult<()> {
        let mut shared = self.shared.write().expect("lock poisoned");
        if shared.entries.contains_key(&entry.id) {
            return Err(BlockError::BlockExists);
        }
        shared.used_bytes += entry.size;
        shared.entries.insert(entry.id, entry);
        Ok(())
    }

    fn remove(&self, id: &BlockId) -> BlockResult<IndexEntry> {
        let mut shared = self.shared.write().expect("lock poisoned");
        match shared.entries.remove(id) {
            Some(entry) => {
                shared.used_bytes -= entry.size;
                Ok(entry)
            }
            None => Err(BlockError::BlockNotFound),
        }
    }

    fn exists(&self, id: &BlockId) -> bool {
        self.shared
            .read()
            .expect("lock poisoned")
            .entries
            .contains_key(id)
    }

    fn iter(&self, f: &mut dyn FnMut(&IndexEntry) -> BlockResult<()>) -> BlockResult<()> {
        let shared = self.shared.read().expect("lock poisoned");
        for entry in shared.entries.values() {
            f(entry)?;
        }
        Ok(())
    }

    fn stats(&self) -> IndexStats {
        let shared = self.shared.read().expect("lock poisoned");
        let mut stats = IndexStats::default();
        for entry in shared.entries.values() {
            stats.record(entry);
        }
        debug_assert_eq!(stats.used_bytes, shared.used_bytes);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casket_types::BlockType;

    fn entry(b: u8, size: usize) -> IndexEntry {
        IndexEntry::inline(BlockId::from_digest([b; 32]), BlockType::Data, vec![0; size])
    }

    #[test]
    fn set_get_roundtrip() {
        let idx = MemoryIndex::new();
        let e = entry(1, 10);
        idx.set(e.clone()).unwrap();
        assert_eq!(idx.get(&e.id).unwrap(), e);
        assert!(idx.exists(&e.id));
    }

    #[test]
    fn get_missing_is_not_found() {
        let idx = MemoryIndex::new();
        let err = idx.get(&BlockId::from_digest([9; 32])).unwrap_err();
        assert!(matches!(err, BlockError::BlockNotFound));
    }

    #[test]
    fn duplicate_set_is_exists() {
        let idx = MemoryIndex::new();
        idx.set(entry(1, 10)).unwrap();
        let err = idx.set(entry(1, 10)).unwrap_err();
        assert!(matches!(err, BlockError::BlockExists));
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn remove_returns_entry_and_updates_usage() {
        let idx = MemoryIndex::new();
        idx.set(entry(1, 10)).unwrap();
        idx.set(entry(2, 20)).unwrap();
        assert_eq!(idx.stats().used_bytes, 30);

        let removed = idx.remove(&BlockId::from_digest([1; 32])).unwrap();
        assert_eq!(removed.size, 10);
        assert_eq!(idx.stats().used_bytes, 20);

        let err = idx.remove(&BlockId::from_digest([1; 32])).unwrap_err();
        assert!(matches!(err, BlockError::BlockNotFound));
    }

    #[test]
    fn iter_visits_all_and_short_circuits() {
        let idx = MemoryIndex::new();
        for b in 1..=4u8 {
            idx.set(entry(b, b as usize)).unwrap();
        }

        let mut seen = 0;
        idx.iter(&mut |_| {
            seen += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, 4);

        let mut calls = 0;
        let err = idx
            .iter(&mut |_| {
                calls += 1;
                Err(BlockError::InvalidBlock)
            })
            .unwrap_err();
        assert!(matches!(err, BlockError::InvalidBlock));
        assert_eq!(calls, 1);
    }

    #[test]
    fn stats_count_by_type() {
        let idx = MemoryIndex::new();
        idx.set(entry(1, 10)).unwrap();
        idx.set(IndexEntry::inline(
            BlockId::from_digest([2; 32]),
            BlockType::Tree,
            vec![0; 5],
        ))
        .unwrap();

        let stats = idx.stats();
        assert_eq!(stats.data_blocks, 1);
        assert_eq!(stats.tree_blocks, 1);
        assert_eq!(stats.total_blocks, 2);
    }

    #[test]
    fn concurrent_readers() {
        use std::sync::Arc;
        use std::thread;

        let idx = Arc::new(MemoryIndex::new());
        let e = entry(1, 100);
        idx.set(e.clone()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let idx = Arc::clone(&idx);
                let want = e.id;
                thread::spawn(move || {
                    assert!(idx.exists(&want));
                    assert_eq!(idx.get(&want).unwrap().size, 100);
                })
            })
            .collect();
        for h in handles {
            h.join().expect("reader thread panicked");
        }
    }
}

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use casket_block::{Block, BlockError, BlockResult, FileDataBlock, FileDataWriter};
use casket_types::{BlockId, HashKind};

/// File-based raw device: persists Data blocks only, one file per block in
/// the data directory, named by hex id and containing `type ‖ body`.
pub struct FileRawDevice {
    datadir: PathBuf,
    hash: HashKind,
}

impl FileRawDevice {
    /// Open a raw device rooted at `datadir`, creating the directory if
    /// needed.
    pub fn new(datadir: &Path, hash: HashKind) -> BlockResult<Self> {
        fs::create_dir_all(datadir)?;
        let datadir = datadir.canonicalize()?;
        if !datadir.is_dir() {
            return Err(BlockError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "data path must be a directory",
            )));
        }
        Ok(Self { datadir, hash })
    }

    /// Hash function used for id generation.
    pub fn hasher(&self) -> HashKind {
        self.hash
    }

    pub fn datadir(&self) -> &Path {
        &self.datadir
    }

    fn block_path(&self, id: &BlockId) -> PathBuf {
        self.datadir.join(id.to_hex())
    }

    /// Open an unfinalized block writer pointed at the data directory.
    pub fn new_block(&self) -> BlockResult<FileDataWriter> {
        FileDataBlock::create(&self.datadir, self.hash)
    }

    /// Persist a block's body. Copies exactly `size` bytes from the
    /// block's reader into a fresh block file; the returned id is computed
    /// from the copied content. An already-present id returns
    /// [`BlockError::BlockExists`] without copying.
    pub fn set(&self, blk: &Block) -> BlockResult<BlockId> {
        let id = blk.id().ok_or(BlockError::InvalidBlock)?;
        if self.exists(&id) {
            return Err(BlockError::BlockExists);
        }

        let mut src = blk.reader().inspect_err(|err| {
            error!(id = %id.short_hex(), %err, "raw set: opening source reader failed");
        })?;
        let mut dst = self.new_block()?;
        copy_exact(&mut dst, &mut src, blk.size()).inspect_err(|err| {
            error!(id = %id.short_hex(), %err, "raw set: body copy failed");
        })?;
        let written = dst.finish()?;

        debug!(id = %written.id().short_hex(), size = written.size(), "raw block written");
        Ok(written.id())
    }

    /// Load a block by id. The body size is the file size minus the type
    /// byte.
    pub fn get(&self, id: &BlockId) -> BlockResult<FileDataBlock> {
        FileDataBlock::load(&self.block_path(id), self.hash)
    }

    /// Unlink a block file. Missing files return
    /// [`BlockError::BlockNotFound`].
    pub fn remove(&self, id: &BlockId) -> BlockResult<()> {
        match fs::remove_file(self.block_path(id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(BlockError::BlockNotFound)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn exists(&self, id: &BlockId) -> bool {
        self.block_path(id).is_file()
    }

    /// Enumerate the ids of all block files: directory entries whose names
    /// parse as a full-length hex digest. Other entries are skipped.
    pub fn iter_ids<F>(&self, mut f: F) -> BlockResult<()>
    where
        F: FnMut(BlockId) -> BlockResult<()>,
    {
        for dirent in fs::read_dir(&self.datadir)? {
            let dirent = dirent?;
            if !dirent.file_type()?.is_file() {
                continue;
            }
            let name = dirent.file_name();
            let Some(name) = name.to_str() else { continue };
            let Ok(id) = BlockId::from_hex(name) else { continue };
            f(id)?;
        }
        Ok(())
    }

    /// Number of valid block files on disk.
    pub fn count(&self) -> BlockResult<usize> {
        let mut n = 0;
        self.iter_ids(|_| {
            n += 1;
            Ok(())
        })?;
        Ok(n)
    }
}

/// Copy exactly `size` bytes from `src` to `dst`, failing with
/// [`BlockError::IncompleteWrite`] if the source runs short.
pub fn copy_exact<W: Write, R: Read>(dst: &mut W, src: &mut R, size: u64) -> BlockResult<()> {
    let copied = std::io::copy(&mut src.take(size), dst)?;
    if copied != size {
        return Err(BlockError::IncompleteWrite);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use casket_block::DataBlock;

    fn device() -> (tempfile::TempDir, FileRawDevice) {
        let dir = tempfile::tempdir().unwrap();
        let dev = FileRawDevice::new(dir.path(), HashKind::Sha256).unwrap();
        (dir, dev)
    }

    fn data(bytes: &[u8]) -> Block {
        DataBlock::from_bytes(HashKind::Sha256, bytes.to_vec()).into()
    }

    #[test]
    fn set_then_get() {
        let (_dir, dev) = device();
        let blk = data(b"raw device body");
        let id = dev.set(&blk).unwrap();
        assert_eq!(Some(id), blk.id());
        assert!(dev.exists(&id));

        let loaded = dev.get(&id).unwrap();
        assert_eq!(loaded.size(), 15);
        let mut body = Vec::new();
        loaded.reader().unwrap().read_to_end(&mut body).unwrap();
        assert_eq!(body, b"raw device body");
    }

    #[test]
    fn duplicate_set_reports_exists() {
        let (_dir, dev) = device();
        let blk = data(b"twice");
        dev.set(&blk).unwrap();
        let err = dev.set(&blk).unwrap_err();
        assert!(matches!(err, BlockError::BlockExists));
    }

    #[test]
    fn remove_unlinks_file() {
        let (_dir, dev) = device();
        let id = dev.set(&data(b"to remove")).unwrap();
        dev.remove(&id).unwrap();
        assert!(!dev.exists(&id));
        assert!(matches!(dev.remove(&id), Err(BlockError::BlockNotFound)));
        assert!(matches!(dev.get(&id), Err(BlockError::BlockNotFound)));
    }

    #[test]
    fn iter_ids_skips_foreign_files() {
        let (dir, dev) = device();
        let id1 = dev.set(&data(b"one")).unwrap();
        let id2 = dev.set(&data(b"two")).unwrap();
        fs::write(dir.path().join("not-a-block.tmp"), b"junk").unwrap();
        fs::create_dir(dir.path().join("subdir")).unwrap();

        let mut seen = Vec::new();
        dev.iter_ids(|id| {
            seen.push(id);
            Ok(())
        })
        .unwrap();
        seen.sort();
        let mut want = vec![id1, id2];
        want.sort();
        assert_eq!(seen, want);
        assert_eq!(dev.count().unwrap(), 2);
    }

    #[test]
    fn copy_exact_detects_short_source() {
        let mut out = Vec::new();
        let err = copy_exact(&mut out, &mut &b"short"[..], 10).unwrap_err();
        assert!(matches!(err, BlockError::IncompleteWrite));
    }

    #[test]
    fn set_computes_canonical_id_from_content() {
        let (_dir, dev) = device();
        let blk = data(&[0xC3; 5000]);
        let id = dev.set(&blk).unwrap();
        let loaded = dev.get(&id).unwrap();
        assert_eq!(loaded.compute_hash().unwrap(), id);
    }
}

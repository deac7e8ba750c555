use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use casket_types::{BlockId, BlockType, BlockUri, HashKind};
use tempfile::NamedTempFile;

use crate::block::read_block_type;
use crate::error::{BlockError, BlockResult};
use crate::hashing::HashingWriter;

/// Default permissions for finished block files.
const BLOCK_FILE_MODE: u32 = 0o444;

/// File-backed data block. The on-disk format is `type ‖ body`; the file
/// basename is the hex id.
#[derive(Debug, Clone)]
pub struct FileDataBlock {
    id: BlockId,
    path: PathBuf,
    size: u64,
    hash: HashKind,
}

impl FileDataBlock {
    /// Load a block from an existing file whose basename is its hex id.
    /// The file is stat'ed but not opened.
    pub fn load(path: &Path, hash: HashKind) -> BlockResult<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or(BlockError::InvalidBlock)?;
        let id = BlockId::from_hex(name)?;

        let meta = fs::metadata(path).map_err(|_| BlockError::BlockNotFound)?;
        if meta.len() == 0 {
            return Err(BlockError::InvalidBlock);
        }

        Ok(Self {
            id,
            path: path.to_path_buf(),
            // Deduct the leading type byte.
            size: meta.len() - 1,
            hash,
        })
    }

    /// Open a writer that spools the body to a temp file and hard-links it
    /// into `datadir` under its hex id on [`FileDataWriter::finish`].
    pub fn create(datadir: &Path, hash: HashKind) -> BlockResult<FileDataWriter> {
        let tmp = NamedTempFile::new()?;
        let mut hw = HashingWriter::new(hash, tmp);
        // The type tag leads the file and the hash.
        hw.write_all(&[BlockType::Data.as_byte()])
            .map_err(|_| BlockError::WriteBlockType)?;
        Ok(FileDataWriter {
            hw,
            datadir: datadir.to_path_buf(),
            size: 0,
            hash,
        })
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Body size (the file size minus the type byte).
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn uri(&self) -> BlockUri {
        BlockUri::file(self.path.to_string_lossy().into_owned())
    }

    pub fn hash_kind(&self) -> HashKind {
        self.hash
    }

    /// Open the file for reading, positioned past the leading type byte.
    pub fn reader(&self) -> BlockResult<File> {
        let mut fh = File::open(&self.path).map_err(|_| BlockError::BlockNotFound)?;
        read_block_type(&mut fh)?;
        Ok(fh)
    }

    /// Recompute the id from the file contents.
    pub fn compute_hash(&self) -> BlockResult<BlockId> {
        let mut fh = File::open(&self.path)?;
        fh.seek(SeekFrom::Start(0))?;
        let mut hasher = self.hash.hasher();
        let mut buf = [0u8; 8192];
        loop {
            let n = fh.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finalize())
    }
}

/// In-progress write of a file-backed data block.
///
/// Bytes spool to a temp file under the system temp dir. On finish the temp
/// file is hard-linked to `<datadir>/<hex-id>` and unlinked from the temp
/// location; if the destination already exists the write reports
/// [`BlockError::BlockExists`] and the temp file is discarded.
pub struct FileDataWriter {
    hw: HashingWriter<NamedTempFile>,
    datadir: PathBuf,
    size: u64,
    hash: HashKind,
}

impl FileDataWriter {
    /// Body bytes written so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Seal the block: flush, finalize the id, and link the file into the
    /// data directory.
    pub fn finish(mut self) -> BlockResult<FileDataBlock> {
        self.hw.flush()?;
        let hash = self.hash;
        let size = self.size;
        let (id, _, tmp) = self.hw.finalize();

        let dest = self.datadir.join(id.to_hex());
        if dest.exists() {
            // Temp file is dropped (and unlinked) on return.
            return Err(BlockError::BlockExists);
        }
        fs::hard_link(tmp.path(), &dest)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dest, fs::Permissions::from_mode(BLOCK_FILE_MODE))?;
        }
        // NamedTempFile removes the temp-side link on drop.
        drop(tmp);

        Ok(FileDataBlock {
            id,
            path: dest,
            size,
            hash,
        })
    }
}

impl Write for FileDataWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.hw.write(buf)?;
        self.size += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.hw.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datadir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn write_then_load() {
        let dir = datadir();
        let mut wr = FileDataBlock::create(dir.path(), HashKind::Sha256).unwrap();
        wr.write_all(b"file backed body").unwrap();
        let blk = wr.finish().unwrap();

        assert_eq!(blk.size(), 16);
        assert_eq!(blk.id(), HashKind::Sha256.block_id(BlockType::Data, b"file backed body"));
        assert_eq!(blk.path(), dir.path().join(blk.id().to_hex()));

        let loaded = FileDataBlock::load(blk.path(), HashKind::Sha256).unwrap();
        assert_eq!(loaded.id(), blk.id());
        assert_eq!(loaded.size(), blk.size());
    }

    #[test]
    fn reader_skips_type_byte() {
        let dir = datadir();
        let mut wr = FileDataBlock::create(dir.path(), HashKind::Sha256).unwrap();
        wr.write_all(b"abc").unwrap();
        let blk = wr.finish().unwrap();

        let mut out = Vec::new();
        blk.reader().unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn on_disk_format_has_type_prefix() {
        let dir = datadir();
        let mut wr = FileDataBlock::create(dir.path(), HashKind::Sha256).unwrap();
        wr.write_all(b"xyz").unwrap();
        let blk = wr.finish().unwrap();

        let raw = fs::read(blk.path()).unwrap();
        assert_eq!(raw[0], BlockType::Data.as_byte());
        assert_eq!(&raw[1..], b"xyz");
    }

    #[test]
    fn duplicate_write_reports_exists() {
        let dir = datadir();
        let mut wr = FileDataBlock::create(dir.path(), HashKind::Sha256).unwrap();
        wr.write_all(b"dup").unwrap();
        wr.finish().unwrap();

        let mut wr = FileDataBlock::create(dir.path(), HashKind::Sha256).unwrap();
        wr.write_all(b"dup").unwrap();
        let err = wr.finish().unwrap_err();
        assert!(matches!(err, BlockError::BlockExists));
    }

    #[test]
    fn compute_hash_matches_id() {
        let dir = datadir();
        let mut wr = FileDataBlock::create(dir.path(), HashKind::Sha256).unwrap();
        wr.write_all(&[0xA5; 1000]).unwrap();
        let blk = wr.finish().unwrap();
        assert_eq!(blk.compute_hash().unwrap(), blk.id());
    }

    #[test]
    fn load_missing_file() {
        let dir = datadir();
        let path = dir.path().join(BlockId::from_digest([1; 32]).to_hex());
        let err = FileDataBlock::load(&path, HashKind::Sha256).unwrap_err();
        assert!(matches!(err, BlockError::BlockNotFound));
    }

    #[test]
    fn load_rejects_non_hex_name() {
        let dir = datadir();
        let path = dir.path().join("not-hex");
        fs::write(&path, b"\x01abc").unwrap();
        assert!(FileDataBlock::load(&path, HashKind::Sha256).is_err());
    }
}

use std::io::{Cursor, Read, Write};

use casket_types::{BlockId, BlockType, BlockUri, HashKind};

use crate::data::DataBlock;
use crate::data_file::FileDataBlock;
use crate::error::{BlockError, BlockResult};
use crate::index::IndexBlock;
use crate::meta::MetaBlock;
use crate::streamed::{StreamedBlock, StreamedReader};
use crate::tree::TreeBlock;

/// Write the one-byte block type tag, ensuring a complete write.
pub fn write_block_type<W: Write>(wr: &mut W, block_type: BlockType) -> BlockResult<()> {
    wr.write_all(&[block_type.as_byte()])
        .map_err(|_| BlockError::WriteBlockType)
}

/// Read and parse the one-byte block type tag, ensuring a complete read.
pub fn read_block_type<R: Read>(rd: &mut R) -> BlockResult<BlockType> {
    let mut tag = [0u8; 1];
    rd.read_exact(&mut tag).map_err(|_| BlockError::ReadBlockType)?;
    BlockType::from_byte(tag[0]).ok_or(BlockError::InvalidBlockType)
}

/// The polymorphic block unit.
///
/// A tagged sum over the block representations: memory- and file-backed
/// data, the three structured kinds, and the stream-backed adapter. Every
/// variant exposes id, type, size, a location URI, and a body reader
/// through the methods here.
#[derive(Debug)]
pub enum Block {
    Data(DataBlock),
    FileData(FileDataBlock),
    Index(IndexBlock),
    Tree(TreeBlock),
    Meta(MetaBlock),
    Streamed(StreamedBlock),
}

impl Block {
    /// The block kind. File-backed and streamed representations report
    /// the kind of the block they carry.
    pub fn block_type(&self) -> BlockType {
        match self {
            Self::Data(_) | Self::FileData(_) => BlockType::Data,
            Self::Index(_) => BlockType::Index,
            Self::Tree(_) => BlockType::Tree,
            Self::Meta(_) => BlockType::Meta,
            Self::Streamed(blk) => blk.block_type(),
        }
    }

    /// The content id. `None` only for a streamed block that has neither
    /// a preset id nor a completed read/write.
    pub fn id(&self) -> Option<BlockId> {
        match self {
            Self::Data(blk) => Some(blk.id()),
            Self::FileData(blk) => Some(blk.id()),
            Self::Index(blk) => Some(blk.id()),
            Self::Tree(blk) => Some(blk.id()),
            Self::Meta(blk) => Some(blk.id()),
            Self::Streamed(blk) => blk.id(),
        }
    }

    /// Size of the body in bytes, excluding the type tag.
    pub fn size(&self) -> u64 {
        match self {
            Self::Data(blk) => blk.size(),
            Self::FileData(blk) => blk.size(),
            Self::Index(blk) => blk.size(),
            Self::Tree(blk) => blk.size(),
            Self::Meta(blk) => blk.size(),
            Self::Streamed(blk) => blk.size(),
        }
    }

    pub fn uri(&self) -> Option<BlockUri> {
        match self {
            Self::Data(blk) => blk.uri().cloned(),
            Self::FileData(blk) => Some(blk.uri()),
            Self::Index(blk) => blk.uri().cloned(),
            Self::Tree(blk) => blk.uri().cloned(),
            Self::Meta(blk) => blk.uri().cloned(),
            Self::Streamed(blk) => blk.uri().cloned(),
        }
    }

    pub fn hash_kind(&self) -> HashKind {
        match self {
            Self::Data(blk) => blk.hash_kind(),
            Self::FileData(blk) => blk.hash_kind(),
            Self::Index(blk) => blk.hash_kind(),
            Self::Tree(blk) => blk.hash_kind(),
            Self::Meta(blk) => blk.hash_kind(),
            Self::Streamed(blk) => blk.hash_kind(),
        }
    }

    /// Open a reader over the body. Structured kinds read their canonical
    /// encoding; a streamed block reads its bounded live stream.
    pub fn reader(&self) -> BlockResult<BlockReader<'_>> {
        Ok(match self {
            Self::Data(blk) => BlockReader::Borrowed(Cursor::new(blk.body())),
            Self::FileData(blk) => BlockReader::File(blk.reader()?),
            Self::Index(blk) => BlockReader::Owned(Cursor::new(blk.encode_body())),
            Self::Tree(blk) => BlockReader::Owned(Cursor::new(blk.encode_body())),
            Self::Meta(blk) => BlockReader::Owned(Cursor::new(blk.encode_body())),
            Self::Streamed(blk) => BlockReader::Streamed(blk.reader()?),
        })
    }

    /// Read the whole body into memory. Streamed blocks are bounded by
    /// their declared size.
    pub fn read_body(&self) -> BlockResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.size() as usize);
        self.reader()?.read_to_end(&mut out)?;
        Ok(out)
    }
}

impl From<DataBlock> for Block {
    fn from(blk: DataBlock) -> Self {
        Self::Data(blk)
    }
}

impl From<FileDataBlock> for Block {
    fn from(blk: FileDataBlock) -> Self {
        Self::FileData(blk)
    }
}

impl From<IndexBlock> for Block {
    fn from(blk: IndexBlock) -> Self {
        Self::Index(blk)
    }
}

impl From<TreeBlock> for Block {
    fn from(blk: TreeBlock) -> Self {
        Self::Tree(blk)
    }
}

impl From<MetaBlock> for Block {
    fn from(blk: MetaBlock) -> Self {
        Self::Meta(blk)
    }
}

impl From<StreamedBlock> for Block {
    fn from(blk: StreamedBlock) -> Self {
        Self::Streamed(blk)
    }
}

/// Reader over a block body.
pub enum BlockReader<'a> {
    Borrowed(Cursor<&'a [u8]>),
    Owned(Cursor<Vec<u8>>),
    File(std::fs::File),
    Streamed(StreamedReader<'a>),
}

impl Read for BlockReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Borrowed(rd) => rd.read(buf),
            Self::Owned(rd) => rd.read(buf),
            Self::File(rd) => rd.read(buf),
            Self::Streamed(rd) => rd.read(buf),
        }
    }
}

//! Typed, content-addressed blocks and their binary encodings.
//!
//! Four block kinds make up the data model: [`DataBlock`] (opaque bytes,
//! memory- or file-backed), [`IndexBlock`] (an ordered list of data-block
//! ids reconstituting one stream), [`TreeBlock`] (named references, like a
//! directory), and [`MetaBlock`] (key-value sidecar). [`StreamedBlock`]
//! adapts a live socket into the same shape with bounded reads.
//!
//! Every block's id is `H(type_byte ‖ canonical_body)` under the
//! configured [`casket_types::HashKind`]; the [`hashing`] module provides
//! the tee-style reader/writer wrappers that compute ids incrementally.

pub mod block;
pub mod data;
pub mod data_file;
pub mod error;
pub mod hashing;
pub mod index;
pub mod meta;
pub mod streamed;
pub mod tree;

pub use block::{read_block_type, write_block_type, Block, BlockReader};
pub use data::{DataBlock, DataBlockWriter};
pub use data_file::{FileDataBlock, FileDataWriter};
pub use error::{parse_error, BlockError, BlockResult};
pub use hashing::{HashingReader, HashingWriter};
pub use index::IndexBlock;
pub use meta::MetaBlock;
pub use streamed::{ByteStream, StreamedBlock, StreamedReader, StreamedWriter};
pub use tree::{TreeBlock, TreeNode, MODE_DIR};

//! File-system style access to the block store.
//!
//! [`Fs`] turns a [`casket_device::BlockDevice`] into files and
//! directories: a file is an IndexBlock-rooted stream written through the
//! sharding [`FileWriter`] and read back in strict order through
//! [`FileReader`]; a directory is a TreeBlock of named entries. Everything
//! is addressed by content id, so identical files collapse to one root.

pub mod error;
pub mod file;
pub mod fs;
pub mod shard_writer;

pub use error::{FsError, FsResult};
pub use file::{DirHandle, FileReader, FileStat, FileWriter, FsNode};
pub use fs::Fs;
pub use shard_writer::{Shard, ShardWriter};

//! Two-level block store: a metadata index paired with a raw file-per-block
//! backend.
//!
//! The [`BlockDevice`] routes by type and size: Index, Tree, and Meta
//! blocks live entirely in the [`BlockIndex`] as canonical bodies; Data
//! blocks below the 4 KiB [`INLINE_THRESHOLD`] are inlined there too, and
//! larger bodies are persisted by the [`FileRawDevice`] as one hex-named
//! file per block.
//!
//! Two index stores are provided: the in-memory [`MemoryIndex`] and the
//! journal-backed [`WalIndex`], which replays an append-only record log on
//! open and so survives restarts.

pub mod device;
pub mod entry;
pub mod index;
pub mod raw;
pub mod wal;

pub use device::{BlockDevice, DeviceDelegate, DeviceStats, INLINE_THRESHOLD};
pub use entry::{IndexEntry, IndexStats};
pub use index::{BlockIndex, MemoryIndex};
pub use raw::{copy_exact, FileRawDevice};
pub use wal::WalIndex;

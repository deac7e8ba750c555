//! Foundation types for the casket block store.
//!
//! This crate provides the identifiers, type tags, hash selection, and
//! location URIs used throughout the workspace. Every other casket crate
//! depends on `casket-types`.
//!
//! # Key Types
//!
//! - [`BlockId`] — Content-addressed identifier (32-byte digest)
//! - [`BlockType`] — One-byte tag for the four block kinds
//! - [`HashKind`] — Hash function selection with a streaming [`BlockHasher`]
//! - [`BlockUri`] — `memory://` / `file://` / `tcp://` block locations

pub mod error;
pub mod hash;
pub mod id;
pub mod kind;
pub mod uri;

pub use error::TypeError;
pub use hash::{BlockHasher, HashKind};
pub use id::BlockId;
pub use kind::BlockType;
pub use uri::{BlockUri, UriScheme};

/// Default shard size used when cutting a stream into data blocks (1 MiB).
pub const DEFAULT_BLOCK_SIZE: u64 = 1024 * 1024;

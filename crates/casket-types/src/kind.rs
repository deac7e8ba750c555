use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// One-byte tag identifying the kind of a block.
///
/// The tag is the first byte hashed into every block id and the first byte
/// of every raw block file on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlockType {
    /// Opaque user bytes; a whole file or a shard of one.
    Data = 1,
    /// Ordered list of data-block ids reconstituting a single stream.
    Index = 2,
    /// Directory-like mapping of names to child block references.
    Tree = 3,
    /// Key-value sidecar optionally pointing at a target block.
    Meta = 4,
}

impl BlockType {
    /// The wire/disk representation of the tag.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parse a tag byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Data),
            2 => Some(Self::Index),
            3 => Some(Self::Tree),
            4 => Some(Self::Meta),
            _ => None,
        }
    }

    /// Parse the textual form used in tree-block entries.
    pub fn from_name(s: &str) -> Result<Self, TypeError> {
        match s {
            "data" => Ok(Self::Data),
            "index" => Ok(Self::Index),
            "tree" => Ok(Self::Tree),
            "meta" => Ok(Self::Meta),
            other => Err(TypeError::UnknownBlockType(other.to_string())),
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => write!(f, "data"),
            Self::Index => write!(f, "index"),
            Self::Tree => write!(f, "tree"),
            Self::Meta => write!(f, "meta"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_roundtrip() {
        for t in [BlockType::Data, BlockType::Index, BlockType::Tree, BlockType::Meta] {
            assert_eq!(BlockType::from_byte(t.as_byte()), Some(t));
        }
    }

    #[test]
    fn tag_values_are_stable() {
        assert_eq!(BlockType::Data.as_byte(), 1);
        assert_eq!(BlockType::Index.as_byte(), 2);
        assert_eq!(BlockType::Tree.as_byte(), 3);
        assert_eq!(BlockType::Meta.as_byte(), 4);
    }

    #[test]
    fn unknown_byte_is_none() {
        assert_eq!(BlockType::from_byte(0), None);
        assert_eq!(BlockType::from_byte(5), None);
    }

    #[test]
    fn name_roundtrip() {
        for t in [BlockType::Data, BlockType::Index, BlockType::Tree, BlockType::Meta] {
            assert_eq!(BlockType::from_name(&t.to_string()).unwrap(), t);
        }
        assert!(matches!(
            BlockType::from_name("bogus"),
            Err(TypeError::UnknownBlockType(_))
        ));
    }
}

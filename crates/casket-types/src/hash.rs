use sha2::Digest;

use crate::id::BlockId;
use crate::kind::BlockType;

/// Hash function used to derive block ids.
///
/// SHA-256 is the default; BLAKE3 is available as a faster alternative.
/// Both peers of a network transport must be configured with the same kind
/// (the hash length is negotiated out-of-band).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HashKind {
    #[default]
    Sha256,
    Blake3,
}

impl HashKind {
    /// Digest length in bytes. Both supported functions produce 32 bytes.
    pub fn digest_len(self) -> usize {
        BlockId::LEN
    }

    /// Start a streaming hash.
    pub fn hasher(self) -> BlockHasher {
        match self {
            Self::Sha256 => BlockHasher::Sha256(sha2::Sha256::new()),
            Self::Blake3 => BlockHasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    /// Hash a block body under its type tag: `H(type ‖ body)`.
    pub fn block_id(self, block_type: BlockType, body: &[u8]) -> BlockId {
        let mut h = self.hasher();
        h.update(&[block_type.as_byte()]);
        h.update(body);
        h.finalize()
    }
}

/// Incremental hash state for one block id computation.
pub enum BlockHasher {
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl BlockHasher {
    /// Feed bytes into the hash.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Finish the computation and return the id.
    pub fn finalize(self) -> BlockId {
        match self {
            Self::Sha256(h) => {
                let digest: [u8; 32] = h.finalize().into();
                BlockId::from_digest(digest)
            }
            Self::Blake3(h) => BlockId::from_digest(*h.finalize().as_bytes()),
        }
    }
}

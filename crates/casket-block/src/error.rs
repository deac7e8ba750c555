use casket_types::TypeError;
use thiserror::Error;

/// Errors from block construction, encoding, and storage.
///
/// The `Display` string of each variant is its canonical wire message: the
/// server sends `to_string()` in an error frame and the client maps the
/// message back to a variant with [`parse_error`].
#[derive(Debug, Error)]
pub enum BlockError {
    /// Malformed body or missing id.
    #[error("invalid block")]
    InvalidBlock,

    /// Absent from the index or the raw backend.
    #[error("block not found")]
    BlockNotFound,

    /// Duplicate write attempt. Often not fatal: the caller proceeds with
    /// the existing id.
    #[error("block exists")]
    BlockExists,

    /// Type byte unknown or disallowed in context.
    #[error("invalid block type")]
    InvalidBlockType,

    /// Short read of the leading type byte.
    #[error("failed to read block type")]
    ReadBlockType,

    /// Short write of the leading type byte.
    #[error("failed to write block type")]
    WriteBlockType,

    #[error("unsupported scheme")]
    UnsupportedScheme,

    /// A second concurrent reader or writer was opened on a single block.
    #[error("reader/writer already open")]
    ReaderWriterOpen,

    #[error("incomplete write")]
    IncompleteWrite,

    #[error("incomplete read")]
    IncompleteRead,

    /// The output sink accepted fewer bytes than offered.
    #[error("short write")]
    ShortWrite,

    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// An error message from a peer that maps to no known variant.
    #[error("{0}")]
    Other(String),
}

/// Result alias for block operations.
pub type BlockResult<T> = Result<T, BlockError>;

impl From<TypeError> for BlockError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::UnsupportedScheme => Self::UnsupportedScheme,
            TypeError::UnknownBlockType(_) => Self::InvalidBlockType,
            _ => Self::InvalidBlock,
        }
    }
}

/// Map a canonical wire message back to its typed error.
///
/// Unknown messages come back as [`BlockError::Other`] carrying the raw
/// text.
pub fn parse_error(msg: &str) -> BlockError {
    match msg {
        "invalid block" => BlockError::InvalidBlock,
        "block not found" => BlockError::BlockNotFound,
        "block exists" => BlockError::BlockExists,
        "invalid block type" => BlockError::InvalidBlockType,
        "failed to read block type" => BlockError::ReadBlockType,
        "failed to write block type" => BlockError::WriteBlockType,
        "unsupported scheme" => BlockError::UnsupportedScheme,
        "reader/writer already open" => BlockError::ReaderWriterOpen,
        "incomplete write" => BlockError::IncompleteWrite,
        "incomplete read" => BlockError::IncompleteRead,
        "short write" => BlockError::ShortWrite,
        other => BlockError::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_messages_roundtrip() {
        let errors = [
            BlockError::InvalidBlock,
            BlockError::BlockNotFound,
            BlockError::BlockExists,
            BlockError::InvalidBlockType,
            BlockError::ReadBlockType,
            BlockError::WriteBlockType,
            BlockError::UnsupportedScheme,
            BlockError::ReaderWriterOpen,
            BlockError::IncompleteWrite,
            BlockError::IncompleteRead,
            BlockError::ShortWrite,
        ];
        for err in errors {
            let msg = err.to_string();
            let parsed = parse_error(&msg);
            assert_eq!(parsed.to_string(), msg);
            assert!(!matches!(parsed, BlockError::Other(_)), "{msg} parsed as Other");
        }
    }

    #[test]
    fn unknown_message_is_opaque() {
        let parsed = parse_error("connection reset by peer");
        assert!(matches!(parsed, BlockError::Other(_)));
        assert_eq!(parsed.to_string(), "connection reset by peer");
    }

    #[test]
    fn type_error_conversion() {
        let err: BlockError = TypeError::UnsupportedScheme.into();
        assert!(matches!(err, BlockError::UnsupportedScheme));
        let err: BlockError = TypeError::UnknownBlockType("x".into()).into();
        assert!(matches!(err, BlockError::InvalidBlockType));
        let err: BlockError = TypeError::InvalidHex("x".into()).into();
        assert!(matches!(err, BlockError::InvalidBlock));
    }
}

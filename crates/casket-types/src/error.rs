use thiserror::Error;

/// Errors from parsing and constructing foundation types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid id length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("unknown block type: {0}")]
    UnknownBlockType(String),

    #[error("unsupported scheme")]
    UnsupportedScheme,

    #[error("malformed uri: {0}")]
    MalformedUri(String),
}

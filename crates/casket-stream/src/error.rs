use casket_block::BlockError;
use thiserror::Error;

/// Errors from the sharding and assembly pipelines.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The input stream read was cancelled via the cancel token.
    #[error("read cancelled")]
    ReadCancelled,

    /// Assembly was cancelled via the cancel token.
    #[error("assemble cancelled")]
    AssembleCancelled,

    /// The root id did not resolve to an index block.
    #[error("not an index block")]
    NotIndexBlock,

    /// The output sink accepted fewer bytes than offered.
    #[error("short write")]
    ShortWrite,

    #[error(transparent)]
    Block(#[from] BlockError),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for pipeline operations.
pub type StreamResult<T> = Result<T, StreamError>;

use casket_block::BlockError;
use thiserror::Error;

/// Errors from the file-system layer.
#[derive(Debug, Error)]
pub enum FsError {
    /// The id resolved to a file where a directory was required.
    #[error("not a directory")]
    NotDirectory,

    /// The id resolved to a directory where a file was required.
    #[error("is a directory")]
    IsDirectory,

    /// The background block writer failed before the file was sealed.
    #[error("file write aborted: {0}")]
    WriteAborted(String),

    #[error(transparent)]
    Block(#[from] BlockError),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for file-system operations.
pub type FsResult<T> = Result<T, FsError>;

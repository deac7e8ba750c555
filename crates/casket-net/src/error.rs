use casket_block::BlockError;
use thiserror::Error;

/// Errors from the wire transport.
#[derive(Debug, Error)]
pub enum NetError {
    /// A frame declared a payload above the 64-bit length bound.
    #[error("payload size exceeded")]
    ExceededPayload,

    /// Operation attempted on a closed client pool or server.
    #[error("transport shutdown")]
    TransportShutdown,

    /// The server was started without a registered block device.
    #[error("block device not registered")]
    DeviceNotRegistered,

    /// A request carried an op byte outside the protocol.
    #[error("unknown request op: {0}")]
    UnknownOp(u8),

    /// The id confirmed by the server does not match the id sent.
    #[error("id mismatch: sent {sent}, confirmed {confirmed}")]
    IdMismatch { sent: String, confirmed: String },

    /// A typed block error, local or parsed from a peer's error frame.
    #[error(transparent)]
    Block(#[from] BlockError),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for transport operations.
pub type NetResult<T> = Result<T, NetError>;

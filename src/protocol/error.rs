//! Protocol error types

use thiserror::Error;

/// Errors raised while encoding or decoding protocol messages
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Buffer too short to hold a message header
    #[error("Message truncated: {0} bytes")]
    Truncated(usize),

    /// Buffer does not start with the protocol magic
    #[error("Invalid message magic")]
    BadMagic,

    /// Message was written by an incompatible protocol version
    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Message body could not be serialized or deserialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for ProtocolError {
    fn from(err: bincode::Error) -> Self {
        ProtocolError::Serialization(err.to_string())
    }
}

/// Result type alias for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

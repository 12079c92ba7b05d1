//! Server Error Types

use thiserror::Error;

use super::ServerState;
use crate::device::DeviceError;

/// Errors that abort startup or serving
#[derive(Error, Debug)]
pub enum ServerError {
    /// Binding or accepting failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A device stream could not be started
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// `serve` was called outside the `Created` state
    #[error("Cannot serve from state: {0}")]
    InvalidState(ServerState),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

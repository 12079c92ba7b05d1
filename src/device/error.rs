//! Device error types

use thiserror::Error;

use super::StreamKind;

/// Failures raised by a capture backend
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The requested frame mode is not usable
    #[error("Invalid frame mode: {0}")]
    InvalidMode(String),

    /// Starting a stream failed
    #[error("Failed to start {kind} stream: {reason}")]
    StartStream { kind: StreamKind, reason: String },

    /// Stopping a stream failed
    #[error("Failed to stop {kind} stream: {reason}")]
    StopStream { kind: StreamKind, reason: String },
}

/// Result type alias for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DeviceError::StartStream {
            kind: StreamKind::Depth,
            reason: "sensor busy".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to start depth stream: sensor busy");

        let err = DeviceError::InvalidMode("fps must be non-zero".to_string());
        assert_eq!(err.to_string(), "Invalid frame mode: fps must be non-zero");
    }
}

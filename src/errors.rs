// SPDX-License-Identifier: MPL-2.0

//! Error types for the bridge

use std::fmt;

use crate::backends::driver::CameraStatus;
use crate::backends::host::HostError;
use crate::bridge::SessionState;

/// Result type alias using BridgeError
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Main bridge error type
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Operation not valid in the current session state
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    /// Frame-rate key not in the supported table
    UnsupportedFrameRate(u32),
    /// No camera behind the descriptor
    NoDevice,
    /// More than one camera behind the descriptor
    AmbiguousDevice(usize),
    /// The camera does not offer the use case mapped to the frame rate
    UseCaseNotFound(String),
    /// A driver call failed
    Device {
        operation: &'static str,
        status: CameraStatus,
    },
    /// A frame had more points than the buffer holds
    BufferOverflow { points: usize, capacity: usize },
    /// Host runtime errors
    Host(HostError),
    /// Configuration errors
    Config(String),
    /// I/O errors (thread spawn, config file)
    Io(String),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::InvalidState { operation, state } => {
                write!(f, "Cannot {} while session is {}", operation, state)
            }
            BridgeError::UnsupportedFrameRate(key) => {
                write!(f, "Unsupported frame rate: {}", key)
            }
            BridgeError::NoDevice => write!(f, "Cannot create the camera device"),
            BridgeError::AmbiguousDevice(count) => {
                write!(f, "Expected one camera, found {}", count)
            }
            BridgeError::UseCaseNotFound(name) => {
                write!(f, "Cannot find appropriate mode: {}", name)
            }
            BridgeError::Device { operation, status } => {
                write!(f, "Cannot {}, CODE {}", operation, status.code())
            }
            BridgeError::BufferOverflow { points, capacity } => {
                write!(f, "Frame of {} points exceeds capacity {}", points, capacity)
            }
            BridgeError::Host(e) => write!(f, "Host runtime error: {}", e),
            BridgeError::Config(msg) => write!(f, "Configuration error: {}", msg),
            BridgeError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<HostError> for BridgeError {
    fn from(err: HostError) -> Self {
        BridgeError::Host(err)
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Config(format!("JSON error: {}", err))
    }
}

/// Attach the failing operation to a driver status
pub(crate) trait DeviceContext<T> {
    fn device_op(self, operation: &'static str) -> BridgeResult<T>;
}

impl<T> DeviceContext<T> for Result<T, CameraStatus> {
    fn device_op(self, operation: &'static str) -> BridgeResult<T> {
        self.map_err(|status| {
            tracing::error!(operation, code = status.code(), %status, "Driver call failed");
            BridgeError::Device { operation, status }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_message_has_code() {
        let err: BridgeResult<()> = Err(CameraStatus::DeviceIsBusy).device_op("start capture");
        assert_eq!(err.unwrap_err().to_string(), "Cannot start capture, CODE 4100");
    }
}

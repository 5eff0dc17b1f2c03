use thiserror::Error;

use crate::ftms::ResultCode;

/// Errors that can occur when talking to an FTMS fitness machine
#[derive(Error, Debug)]
pub enum TreadctlError {
    /// Bluetooth Low Energy related errors
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// No FTMS device found during scanning
    #[error("No FTMS device found")]
    DeviceNotFound,

    /// Device connection failed
    #[error("Failed to connect to device: {0}")]
    ConnectionFailed(String),

    /// Device disconnected unexpectedly
    #[error("Device disconnected")]
    Disconnected,

    /// An operation that needs a connection was issued without one
    #[error("Not connected - use 'connect' first")]
    NotConnected,

    /// Command or connect attempt timed out
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// The machine answered a control-point write with a non-success result
    #[error("Device rejected command {opcode:#04X}: {code}")]
    CommandRejected {
        /// Control-point opcode the device answered
        opcode: u8,
        /// Result code reported by the device
        code: ResultCode,
    },

    /// Invalid command parameters (rejected before anything is sent)
    #[error("Invalid command parameters: {0}")]
    InvalidParameters(String),

    /// Malformed data received from the device
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for treadctl operations
pub type Result<T> = std::result::Result<T, TreadctlError>;

impl TreadctlError {
    /// Check if this error indicates a connection issue
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Ble(_)
                | Self::ConnectionFailed(_)
                | Self::Disconnected
                | Self::NotConnected
                | Self::DeviceNotFound
        )
    }

    /// Check if this error is recoverable by re-issuing the command
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::InvalidParameters(_) | Self::CommandRejected { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let connection_error = TreadctlError::ConnectionFailed("test".to_string());
        assert!(connection_error.is_connection_error());
        assert!(!connection_error.is_recoverable());

        let timeout_error = TreadctlError::Timeout { timeout_ms: 3000 };
        assert!(!timeout_error.is_connection_error());
        assert!(timeout_error.is_recoverable());

        let rejected = TreadctlError::CommandRejected {
            opcode: 0x02,
            code: ResultCode::InvalidParameter,
        };
        assert!(!rejected.is_connection_error());
        assert!(rejected.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let error = TreadctlError::InvalidParameters("speed out of range".to_string());
        let error_string = format!("{error}");
        assert!(error_string.contains("Invalid command parameters"));
        assert!(error_string.contains("speed out of range"));

        let rejected = TreadctlError::CommandRejected {
            opcode: 0x08,
            code: ResultCode::NotSupported,
        };
        assert!(format!("{rejected}").contains("0x08"));
    }
}

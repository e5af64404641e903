//! # Error Types
//!
//! Custom error types for Ecometer Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for Ecometer Bridge
#[derive(Debug, Error)]
pub enum EcometerError {
    /// No data arrived within the read window
    #[error("Timed out waiting for a frame")]
    Timeout,

    /// First two bytes did not match the frame magic
    #[error("Header mismatch: got {0:02X?}")]
    HeaderMismatch([u8; 2]),

    /// Length or field inconsistency inside a frame
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// CRC trailer did not match the frame contents
    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    CrcMismatch { expected: u16, actual: u16 },

    /// Serial port could not be opened or failed mid-frame
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Live frame reported a total capacity of zero
    #[error("Total capacity is zero, cannot compute fill percentage")]
    ZeroCapacity,

    /// Supervisor was asked to start twice
    #[error("Polling supervisor already started")]
    AlreadyStarted,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EcometerError {
    /// Whether the polling loop may continue after this error.
    ///
    /// Frame-level and transport errors are handled inside one loop
    /// iteration. Anything else ends the polling session.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EcometerError::Timeout
                | EcometerError::HeaderMismatch(_)
                | EcometerError::MalformedFrame(_)
                | EcometerError::CrcMismatch { .. }
                | EcometerError::Serial(_)
                | EcometerError::ZeroCapacity
        )
    }
}

/// Result type alias for Ecometer Bridge
pub type Result<T> = std::result::Result<T, EcometerError>;

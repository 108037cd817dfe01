//! Error types for Wavelink
//!
//! This module defines the error types shared between the SPI layer and the
//! client engine. Errors are designed to be ergonomic and provide clear
//! context for debugging.

use thiserror::Error;

/// Result type alias for Wavelink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for SPI-level operations
#[derive(Error, Debug)]
pub enum Error {
    /// Protocol errors
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection errors
    #[error("connection error: {0}")]
    Connection(String),

    /// Operation exceeded its deadline
    #[error("operation timed out")]
    Timeout,
}

/// WebSocket upgrade protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Missing required header
    #[error("missing required header: {0}")]
    MissingHeader(String),

    /// Invalid header value
    #[error("invalid header value for {header}: {value}")]
    InvalidHeaderValue {
        /// Header name
        header: String,
        /// Received value
        value: String,
    },

    /// Unexpected HTTP status
    #[error("unexpected HTTP status: {0}")]
    UnexpectedStatus(u16),

    /// Invalid accept key
    #[error("invalid Sec-WebSocket-Accept - expected: {expected}, received: {received}")]
    InvalidAcceptKey {
        /// Value computed from the request key
        expected: String,
        /// Value sent by the server
        received: String,
    },

    /// Malformed message
    #[error("invalid format: {0}")]
    InvalidFormat(String),
}

/// WebSocket close codes as defined in RFC 6455
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// Normal closure
    Normal,
    /// Going away
    Away,
    /// Protocol error
    ProtocolError,
    /// Unsupported data
    Unsupported,
    /// No status received
    NoStatus,
    /// Abnormal closure
    Abnormal,
    /// Internal error
    Internal,
    /// Application-specific close code
    Application(u16),
}

impl CloseCode {
    /// Create a `CloseCode` from a u16
    pub fn from(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::Away,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::Unsupported,
            1005 => CloseCode::NoStatus,
            1006 => CloseCode::Abnormal,
            1011 => CloseCode::Internal,
            code if (3000..=4999).contains(&code) => CloseCode::Application(code),
            _ => CloseCode::ProtocolError,
        }
    }

    /// Get the numeric value of the close code
    pub fn code(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::Away => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::NoStatus => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::Internal => 1011,
            CloseCode::Application(code) => *code,
        }
    }

    /// Check if this close code indicates an error
    pub fn is_error(&self) -> bool {
        !matches!(self, CloseCode::Normal | CloseCode::Away)
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_conversion() {
        assert_eq!(CloseCode::from(1000), CloseCode::Normal);
        assert_eq!(CloseCode::from(3000), CloseCode::Application(3000));
        assert_eq!(CloseCode::from(999), CloseCode::ProtocolError);
        assert_eq!(CloseCode::from(1006).code(), 1006);
    }

    #[test]
    fn test_error_display() {
        let err = Error::Protocol(ProtocolError::UnexpectedStatus(500));
        assert!(err.to_string().contains("500"));
    }
}

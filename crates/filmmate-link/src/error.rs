//! Error types for the FilmMate link
//!
//! Every failure the controller can hit while acquiring a device, negotiating
//! a channel, or running the command loop is a [`LinkError`]. None of them are
//! retried: the session ends and the error is surfaced to the caller.

use thiserror::Error;

/// Main error type for link operations
#[derive(Error, Debug)]
pub enum LinkError {
    // ===== Acquisition Errors =====
    /// No Bluetooth adapter is available on this host
    #[error("No Bluetooth adapter found")]
    NoAdapter,

    /// Scan completed without a name match
    #[error("No device advertising a name containing {target:?} was found")]
    DeviceNotFound {
        /// Target name substring that was searched for
        target: String,
    },

    /// Connected, but no characteristic supports both write and notify
    #[error("Device {device} exposes no characteristic with write and notify")]
    NoSuitableChannel {
        /// Address of the device that was inspected
        device: String,
    },

    // ===== Format Errors =====
    /// Inbound payload carried zero bytes
    #[error("Empty payload cannot be decoded")]
    EmptyPayload,

    /// Inbound payload encodes a value wider than 64 bits
    #[error("Payload of {len} bytes does not fit in a 64-bit signed integer")]
    PayloadOverflow {
        /// Payload length in bytes
        len: usize,
    },

    /// Requested encoding width is not usable
    #[error("Invalid payload width: {0} bytes")]
    InvalidWidth(usize),

    /// Value cannot be represented in the requested width
    #[error("Value {value} does not fit in {width} bytes")]
    ValueOutOfRange {
        /// Value that was to be encoded
        value: i64,
        /// Target width in bytes
        width: usize,
    },

    // ===== Transport Errors =====
    /// Generic radio stack failure (scan, connect, enumerate, subscribe)
    #[error("Transport error: {0}")]
    Transport(String),

    /// GATT write failed
    #[error("GATT write failed: {0}")]
    WriteFailed(String),

    /// Peripheral dropped the connection
    #[error("Peripheral disconnected")]
    Disconnected,

    /// Operation interrupted by the cancellation signal
    #[error("Operation cancelled")]
    Cancelled,

    // ===== Configuration Errors =====
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Check if this error comes from a malformed payload
    ///
    /// Format errors on inbound notifications are dropped rather than
    /// ending the session.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            LinkError::EmptyPayload | LinkError::PayloadOverflow { .. }
        )
    }

    /// Check if this is a radio/transport level failure
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            LinkError::NoAdapter
                | LinkError::Transport(_)
                | LinkError::WriteFailed(_)
                | LinkError::Disconnected
        )
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            LinkError::NoAdapter => "NO_ADAPTER",
            LinkError::DeviceNotFound { .. } => "DEVICE_NOT_FOUND",
            LinkError::NoSuitableChannel { .. } => "NO_SUITABLE_CHANNEL",
            LinkError::EmptyPayload => "EMPTY_PAYLOAD",
            LinkError::PayloadOverflow { .. } => "PAYLOAD_OVERFLOW",
            LinkError::InvalidWidth(_) => "INVALID_WIDTH",
            LinkError::ValueOutOfRange { .. } => "VALUE_OUT_OF_RANGE",
            LinkError::Transport(_) => "TRANSPORT_ERROR",
            LinkError::WriteFailed(_) => "WRITE_FAILED",
            LinkError::Disconnected => "DISCONNECTED",
            LinkError::Cancelled => "CANCELLED",
            LinkError::InvalidConfig(_) => "INVALID_CONFIG",
            LinkError::Json(_) => "CONFIG_PARSE",
            LinkError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for link operations
pub type Result<T> = std::result::Result<T, LinkError>;

#[cfg(feature = "ble")]
impl From<btleplug::Error> for LinkError {
    fn from(err: btleplug::Error) -> Self {
        match err {
            btleplug::Error::NotConnected => LinkError::Disconnected,
            other => LinkError::Transport(other.to_string()),
        }
    }
}

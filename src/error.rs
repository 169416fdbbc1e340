//! # PACE BMS Error Handling
//!
//! This module defines the error enums used across the crate. Errors are layered
//! the same way the protocol is: a [`DecodeError`] describes a bad frame, a
//! [`TransportError`] describes a failed request/response exchange, and a
//! [`ConfigError`] describes a configuration that cannot be used. [`PaceBmsError`]
//! aggregates all of them for callers that do not care about the layer.

use thiserror::Error;

/// Errors raised while decoding a frame or its INFO payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The frame is structurally invalid (bad markers, non-hex digits, oversize).
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// The frame ended before all fields announced by its header were read.
    #[error("Truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// The frame checksum does not match the frame contents.
    #[error("Invalid checksum: expected 0x{expected:04X}, calculated 0x{calculated:04X}")]
    ChecksumMismatch { expected: u16, calculated: u16 },

    /// The checksum nibble of the LENGTH field is wrong.
    #[error("Invalid length checksum in length field 0x{0:04X}")]
    LengthChecksumMismatch(u16),

    /// A well-formed frame that came from (or was sent to) another bus address.
    #[error("Address mismatch: expected {expected}, got {actual}")]
    AddressMismatch { expected: u8, actual: u8 },

    /// The protocol version byte differs from the configured one.
    #[error("Protocol version mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    VersionMismatch { expected: u8, actual: u8 },

    /// The CID1 (battery chemistry) byte differs from the configured one.
    #[error("CID1 mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChemistryMismatch { expected: u8, actual: u8 },

    /// A request value cannot be represented in its wire field.
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// The device answered with a non-zero return code.
    #[error("Device returned error 0x{code:02X}: {}", return_code_text(.code))]
    ErrorResponse { code: u8 },
}

fn return_code_text(code: &u8) -> &'static str {
    crate::constants::describe_return_code(*code)
}

/// Errors raised by the transport scheduler for a single request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No complete response arrived within the response timeout.
    #[error("Response timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Another request currently owns the serial line.
    #[error("Serial channel busy")]
    ChannelBusy,

    /// A complete frame arrived but could not be decoded.
    #[error("Decode failed: {0}")]
    DecodeFailed(#[from] DecodeError),

    /// The request is not part of the resolved protocol profile.
    #[error("Request {request} is not supported by protocol command set 0x{command_set:02X}")]
    Unsupported {
        request: &'static str,
        command_set: u8,
    },

    /// Reading from or writing to the serial line failed.
    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading or validating configuration. Fatal to the instance.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric option lies outside its permitted range.
    #[error("Option `{option}` out of range: {value} (allowed {min}..={max})")]
    OutOfRange {
        option: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    /// An option carries a value that is not understood.
    #[error("Invalid value for `{option}`: {value}")]
    InvalidValue { option: &'static str, value: String },

    /// No serial port was configured.
    #[error("No serial port configured")]
    MissingPort,

    /// The configuration file could not be read.
    #[error("Failed to read configuration: {0}")]
    Read(#[from] std::io::Error),

    /// The configuration file is not valid JSON for this schema.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level error type of the crate.
#[derive(Debug, Error)]
pub enum PaceBmsError {
    /// Opening or configuring the serial port failed.
    #[error("Serial port error: {0}")]
    SerialPortError(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl From<tokio_serial::Error> for PaceBmsError {
    fn from(err: tokio_serial::Error) -> Self {
        PaceBmsError::SerialPortError(err.to_string())
    }
}

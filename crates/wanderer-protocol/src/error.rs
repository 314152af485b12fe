//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when encoding or decoding protocol data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload exceeds what the configured length field can carry.
    #[error("payload too large: maximum {max} bytes, got {actual}")]
    PayloadTooLarge {
        /// Maximum payload size for the codec variant.
        max: usize,
        /// Actual payload size.
        actual: usize,
    },

    /// Response payload is shorter than the fixed layout requires.
    #[error("response too short: expected at least {expected} bytes, got {actual}")]
    ResponseTooShort {
        /// Expected minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Command code not in the known set.
    #[error("unknown command code: 0x{0:02X}")]
    UnknownCommand(u8),

    /// Response frame decoded to a different kind than the command expects.
    #[error("unexpected response kind (expected {expected})")]
    UnexpectedResponse {
        /// What the command expected back.
        expected: &'static str,
    },

    /// A configuration field is outside the range the device accepts.
    #[error("invalid {field}: {value} (allowed {min}..={max})")]
    InvalidConfig {
        /// Field name.
        field: &'static str,
        /// Rejected value.
        value: u32,
        /// Smallest accepted value.
        min: u32,
        /// Largest accepted value.
        max: u32,
    },

    /// Battery readings are offset by 100 on the wire; anything below the
    /// offset has never been observed on a healthy unit.
    #[error("battery reading below offset: raw 0x{raw:02X}")]
    BatteryUnderflow {
        /// Raw wire value.
        raw: u8,
    },
}

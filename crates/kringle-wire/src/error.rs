//! Wire decoding errors

use kringle_core::KringleError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Unsupported wire version: {0}")]
    UnsupportedVersion(u8),

    #[error("Unknown event type: {0:#04x}")]
    UnknownEventType(u8),

    #[error("Body length {declared} does not match {actual} trailing bytes")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("Field {field} too long: {len} bytes")]
    FieldTooLong { field: &'static str, len: usize },

    #[error("Invalid field: {0}")]
    InvalidField(&'static str),
}

pub type WireResult<T> = Result<T, WireError>;

impl From<WireError> for KringleError {
    fn from(err: WireError) -> Self {
        KringleError::Wire(err.to_string())
    }
}

//! Error types for accessory connections.
//!
//! Every failure the manager can report has its own variant so callers can
//! tell "nothing attached" apart from "attached but access denied".

use thiserror::Error;

/// Errors that can occur while opening, reading or writing an accessory
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdkError {
    /// The host reports no attached accessory
    #[error("no USB accessory attached")]
    NoAccessory,

    /// The host refused access to the accessory
    #[error("permission denied for USB accessory")]
    PermissionDenied,

    /// A connection is already active
    #[error("accessory connection already open")]
    AlreadyOpen,

    /// The host returned no usable descriptor for the accessory
    #[error("accessory descriptor unavailable")]
    DescriptorUnavailable,

    /// Operation requires an open connection
    #[error("accessory connection is not open")]
    NotOpen,

    /// Host service failure (enumeration, binding bridge, ...)
    #[error("host error: {0}")]
    Host(&'static str),

    /// Stream-level I/O failure
    #[error("I/O error: {0:?}")]
    Io(embedded_io::ErrorKind),

    /// Payload exceeds the capacity of a single chunk
    #[error("payload of {0} bytes exceeds chunk capacity")]
    PayloadTooLarge(usize),

    /// A value could not be rendered to text
    #[error("value could not be formatted")]
    Format,
}

impl AdkError {
    /// Stable numeric code, `0` reserved for success
    ///
    /// Used at FFI boundaries where only an integer can cross.
    pub fn code(&self) -> i32 {
        match self {
            AdkError::NoAccessory => 1,
            AdkError::PermissionDenied => 2,
            AdkError::AlreadyOpen => 3,
            AdkError::DescriptorUnavailable => 4,
            AdkError::NotOpen => 5,
            AdkError::Host(_) => 6,
            AdkError::Io(_) => 7,
            AdkError::PayloadTooLarge(_) => 8,
            AdkError::Format => 9,
        }
    }

    /// Maps any `embedded-io` error onto [`AdkError::Io`]
    pub fn from_io<E: embedded_io::Error>(err: &E) -> Self {
        AdkError::Io(err.kind())
    }
}

impl From<embedded_io::ErrorKind> for AdkError {
    fn from(kind: embedded_io::ErrorKind) -> Self {
        AdkError::Io(kind)
    }
}

/// Result type alias for accessory operations
pub type AdkResult<T> = Result<T, AdkError>;

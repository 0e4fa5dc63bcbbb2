//! Error types for the core containers.
//!
//! Only allocating or validating entry points return these. The real-time
//! operations on [`SampleBuffer`](crate::SampleBuffer) and
//! [`EventBuffer`](crate::EventBuffer) never fail at runtime.

use thiserror::Error;

/// Errors raised by core container construction and import.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A constructor received an argument it cannot work with.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Imported event bytes do not follow the record layout.
    #[error("Malformed event data at byte {offset}: {reason}")]
    MalformedEvents {
        /// Byte offset of the offending record.
        offset: usize,
        /// What was wrong with it.
        reason: String,
    },
    /// A stream codec refused a read or write.
    #[error("Codec error: {0}")]
    Codec(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

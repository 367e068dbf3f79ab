//! Protocol error types.

use thiserror::Error;

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Malformed, oversized or otherwise unacceptable peer input.
///
/// Every variant is a protocol violation: the server closes the session that
/// produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A line grew past the limit of the current protocol step.
    #[error("line exceeds {limit} bytes")]
    LineTooLong {
        /// Limit in bytes, excluding the terminator
        limit: usize,
    },

    /// Line bytes are not valid UTF-8.
    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    /// A required field was empty.
    #[error("{field} is empty")]
    EmptyField {
        /// Which field
        field: &'static str,
    },

    /// A field is longer than its limit.
    #[error("{field} exceeds {limit} bytes")]
    FieldTooLong {
        /// Which field
        field: &'static str,
        /// Limit in bytes
        limit: usize,
    },

    /// A field contains a character reserved by the protocol or the record
    /// layout.
    #[error("{field} contains illegal character {ch:?}")]
    IllegalCharacter {
        /// Which field
        field: &'static str,
        /// Offending character
        ch: char,
    },
}

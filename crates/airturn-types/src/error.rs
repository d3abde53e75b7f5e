//! Error types for payload decoding in airturn-types.

use thiserror::Error;

/// Errors that can occur when decoding AirTurn register and notification payloads.
///
/// This error type is platform-agnostic and does not include
/// radio-specific errors (those belong in airturn-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The payload is shorter than the register layout requires.
    #[error("Insufficient bytes: requires {expected} bytes, got {actual}")]
    InsufficientBytes {
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },

    /// A field holds a value outside its defined range.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// A string register is not valid UTF-8.
    #[error("Invalid UTF-8 in string register")]
    InvalidUtf8,
}

impl ParseError {
    pub(crate) fn check_len(data: &[u8], expected: usize) -> ParseResult<()> {
        if data.len() < expected {
            Err(ParseError::InsufficientBytes {
                expected,
                actual: data.len(),
            })
        } else {
            Ok(())
        }
    }
}

/// Result type alias using airturn-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

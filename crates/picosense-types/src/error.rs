//! Error types for payload decoding in picosense-types.

use thiserror::Error;

/// Errors that can occur when decoding sensor payloads.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in picosense-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The payload is shorter than the fixed wire format requires.
    #[error("Malformed payload: expected at least {expected} bytes, got {actual}")]
    MalformedPayload {
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },
}

/// Result type alias using picosense-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

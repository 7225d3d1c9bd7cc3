//! Error types for picosense-core.
//!
//! These are returned by [`LinkAdapter`](crate::LinkAdapter) calls and the
//! session handle. Inside a running session nothing is fatal; failures are
//! reported as [`SessionDiagnostic`](crate::SessionDiagnostic)s instead:
//!
//! | Failure | Session behaviour |
//! |---------|-------------------|
//! | [`Error::RadioUnavailable`] | Stay idle until the radio powers on |
//! | [`Error::ConnectionFailed`] | Return to scanning |
//! | Missing service or characteristic | Stall until the link drops |
//! | [`Error::MalformedPayload`] | Keep the previous value for that field |
//! | Link dropped | Tear down and rescan |
//!
//! There is no retry with backoff; reconnection is triggered by the next
//! discovery, which may be immediate if the peripheral is still advertising.

use thiserror::Error;
use uuid::Uuid;

use picosense_types::ParseError;

/// Errors that can occur when talking to the sensor board.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No adapter, or the adapter is not powered on.
    #[error("Bluetooth radio unavailable")]
    RadioUnavailable,

    /// Connection attempt failed.
    #[error("Connection to {peripheral} failed: {reason}")]
    ConnectionFailed {
        /// The peripheral identifier.
        peripheral: String,
        /// Why the attempt failed.
        reason: String,
    },

    /// A characteristic payload could not be decoded.
    #[error(transparent)]
    MalformedPayload(#[from] ParseError),

    /// Operation attempted while not connected.
    #[error("Not connected to peripheral")]
    NotConnected,

    /// The adapter has no record of the peripheral.
    #[error("Peripheral not found: {0}")]
    PeripheralNotFound(String),

    /// A characteristic was not resolved on the connected peripheral.
    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(Uuid),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The session task has stopped.
    #[error("Session closed")]
    SessionClosed,
}

impl Error {
    /// Create a connection failure.
    pub fn connection_failed(peripheral: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            peripheral: peripheral.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type alias using picosense-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

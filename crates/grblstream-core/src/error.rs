//! Error handling for grblstream
//!
//! Provides error types for the layers of the driver:
//! - Controller errors (machine state and preconditions)
//! - Connection errors (serial transport)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Controller error type
///
/// Represents errors raised by the machine controller when an operation
/// cannot be carried out in its current state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// An operation needed a configuration that has not been set
    #[error("Cannot {operation} before a config is received")]
    ConfigMissing {
        /// The operation that was attempted.
        operation: String,
    },

    /// An operation was called with a missing or malformed payload
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// Why the payload was rejected.
        reason: String,
    },

    /// The machine is not in a state that allows the operation
    #[error("Precondition rejected: {reason}")]
    PreconditionRejected {
        /// Why the operation was refused.
        reason: String,
    },

    /// No command is defined for an instruction name
    #[error("No command currently defined for instruction {instruction}")]
    UnknownInstruction {
        /// The instruction name.
        instruction: String,
    },

    /// A write was attempted while the controller is held in its bootloader
    #[error("Tried to send {data:?} during firmware upload")]
    WriteDuringFirmwareUpload {
        /// The rejected data.
        data: String,
    },
}

/// Connection error type
///
/// Represents errors related to the serial link with the controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// A write to an open port failed
    #[error("Failed to write to port: {reason}")]
    WriteFailed {
        /// The reason the write failed.
        reason: String,
    },

    /// Operation requires an open port
    #[error("Port is not open")]
    NotOpen,

    /// Serial port error
    #[error("Serial port error: {reason}")]
    SerialError {
        /// The reason for the serial port error.
        reason: String,
    },
}

/// Main error type for grblstream
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Io(_))
    }

    /// Check if this is a controller error
    pub fn is_controller_error(&self) -> bool {
        matches!(self, Error::Controller(_))
    }

    /// Check if the machine refused the operation because of its state
    pub fn is_precondition_rejected(&self) -> bool {
        matches!(
            self,
            Error::Controller(ControllerError::PreconditionRejected { .. })
        )
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

//! Custom error types for the sweep acquisition pipeline.
//!
//! This module defines the primary error type, `PnaError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized way to report the
//! different failures that can occur while driving an analyzer, from bad caller
//! input to bus-level communication problems.
//!
//! ## Error Hierarchy
//!
//! `PnaError` separates two families of failure:
//!
//! - **Bad input** (`Validation`, `Range`, `Configuration`): raised before any
//!   command is written to the instrument. The device state is untouched.
//! - **Device failure** (`Channel`, `Io`, `Framing`, `Response`): raised while
//!   talking to the instrument. Device state may be partially changed.
//!
//! Use [`PnaError::category`] to tell the two apart without matching on every
//! variant.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, PnaError>;

/// Coarse classification of a [`PnaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller supplied something invalid. No device command was issued.
    BadInput,
    /// Communication with the device failed or the device misbehaved.
    DeviceFailure,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorCategory::BadInput => "bad_input",
            ErrorCategory::DeviceFailure => "device_failure",
        };
        write!(f, "{}", label)
    }
}

/// Primary error type for analyzer control.
///
/// None of these errors are retried by the crate. They surface synchronously
/// to the caller of the operation that triggered them.
#[derive(Error, Debug)]
pub enum PnaError {
    /// Write, query or read failed at the bus level.
    ///
    /// **Recovery Strategy**: Abort the current sweep, check the connection.
    /// The instrument may be left mid-configuration.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Socket-level I/O failure. Counted as a channel error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Definite-length block header or payload is malformed.
    ///
    /// Raised when the header digit count is outside 1-9, the byte count is
    /// not a decimal integer, the payload is not a whole number of elements,
    /// or the decoded sample count disagrees with the point count. No partial
    /// sample list is ever returned alongside this error.
    #[error("Block framing error: {0}")]
    Framing(String),

    /// Requested power window cannot be reached with any attenuation step.
    #[error("Power range error: {0}")]
    Range(String),

    /// Caller supplied an out-of-range or out-of-enum value.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Instrument answered with something that could not be interpreted.
    #[error("Unexpected response to '{command}': {response:?}")]
    Response {
        /// Command that produced the response
        command: String,
        /// Raw response text
        response: String,
    },

    /// Configuration values parsed but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl PnaError {
    /// Build a [`PnaError::Response`] from a command and its raw reply.
    pub fn response(command: impl Into<String>, response: impl Into<String>) -> Self {
        PnaError::Response {
            command: command.into(),
            response: response.into(),
        }
    }

    /// Classify this error as bad input or device failure.
    pub fn category(&self) -> ErrorCategory {
        match self {
            PnaError::Validation(_) | PnaError::Range(_) | PnaError::Configuration(_) => {
                ErrorCategory::BadInput
            }
            PnaError::Channel(_)
            | PnaError::Io(_)
            | PnaError::Framing(_)
            | PnaError::Response { .. } => ErrorCategory::DeviceFailure,
        }
    }

    /// True when no device command was issued before this error was raised.
    pub fn is_bad_input(&self) -> bool {
        self.category() == ErrorCategory::BadInput
    }
}

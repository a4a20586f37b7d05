//! Protocol errors

use thiserror::Error;

use super::session::SessionState;
use crate::acquisition::ConfigStep;

/// Result alias used throughout the protocol layer
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur while talking to the sensor board
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Serial driver failure not tied to a specific lifecycle step
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Send or receive attempted while the handle is closed
    #[error("Serial port not connected")]
    NotConnected,

    /// Opening the port failed
    #[error("Connection to {port} failed: {reason}")]
    ConnectionFailed {
        /// Port identifier that was being opened
        port: String,
        /// Driver message
        reason: String,
    },

    /// Command channel exhausted its retry budget without a reply
    #[error("No response to '{command}' after {attempts} attempts")]
    CommandTimeout {
        /// Command text as sent (without line ending)
        command: String,
        /// Number of receive attempts made
        attempts: u32,
    },

    /// A configuration verb was not acknowledged
    #[error("Configuration failed at step {index} ({step}): {reason}")]
    ConfigurationFailed {
        /// The step that failed
        step: ConfigStep,
        /// Zero-based position of the step in the configuration sequence
        index: usize,
        /// Why the step is considered unacknowledged
        reason: String,
    },

    /// A batch was empty, short or carried the error sentinel
    #[error("Download failed at batch {batch} of {total}: {reason}")]
    DownloadFailed {
        /// Zero-based index of the failing batch
        batch: usize,
        /// Number of batches in the whole fetch
        total: usize,
        /// What was wrong with the frame
        reason: String,
    },

    /// Device replied with something that cannot be interpreted
    #[error("Invalid response from device: {0}")]
    InvalidResponse(String),

    /// Operation not allowed in the current session state
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        /// Operation that was attempted
        operation: &'static str,
        /// State the session was in
        state: SessionState,
    },

    /// Acquisition parameter out of range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Baud rate not in the supported set
    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    /// Configuration file could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error from the underlying link
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProtocolError {
    /// True for failures that leave the link unusable for the rest of the session
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::NotConnected
                | ProtocolError::ConnectionFailed { .. }
                | ProtocolError::SerialError(_)
                | ProtocolError::IoError(_)
        )
    }
}
